use crate::config::types::{Result, VerifyError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One learner source file plus the type name it must declare.
/// Immutable once read; transformations produce a new unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceUnit {
    path: PathBuf,
    text: String,
    declared_type_name: String,
}

impl SourceUnit {
    /// Build a unit from text already in memory. Blank text is rejected.
    pub fn new(
        path: impl Into<PathBuf>,
        text: impl Into<String>,
        declared_type_name: impl Into<String>,
    ) -> Result<Self> {
        let path = path.into();
        let text = text.into();
        if text.trim().is_empty() {
            return Err(VerifyError::EmptySource(path));
        }
        Ok(Self {
            path,
            text,
            declared_type_name: declared_type_name.into(),
        })
    }

    /// Read a UTF-8 source file.
    pub fn read(path: &Path, declared_type_name: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => VerifyError::SourceNotFound(path.to_path_buf()),
            _ => VerifyError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        Self::new(path, text, declared_type_name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn declared_type_name(&self) -> &str {
        &self.declared_type_name
    }

    /// Same path and type name, different text.
    pub fn with_text(&self, text: impl Into<String>) -> Result<Self> {
        Self::new(self.path.clone(), text, self.declared_type_name.clone())
    }

    /// SHA-256 of the text, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    #[serde(rename = "constructor")]
    Constructor,
    #[serde(rename = "method")]
    Method,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Constructor => "constructor",
            MemberKind::Method => "method",
        }
    }
}

/// Declared parameter type. Matching is exact: no widening, no overload distance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Int,
    Long,
    Float,
    Double,
    Bool,
    Str,
    /// A text sink (a `PrintWriter` on the JVM, `&mut dyn Write` in process)
    Sink,
    /// Any other type, by fully qualified name
    Named(String),
}

impl ParamType {
    pub fn named(name: impl Into<String>) -> Self {
        ParamType::Named(name.into())
    }

    pub fn wire_name(&self) -> &str {
        match self {
            ParamType::Int => "int",
            ParamType::Long => "long",
            ParamType::Float => "float",
            ParamType::Double => "double",
            ParamType::Bool => "boolean",
            ParamType::Str => "string",
            ParamType::Sink => "sink",
            ParamType::Named(name) => name,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Reference to an object living inside a compiled unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    unit_id: String,
    id: u64,
    class: String,
}

impl ObjectRef {
    pub fn new(unit_id: impl Into<String>, id: u64, class: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            id,
            class: class.into(),
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> &str {
        &self.class
    }
}

/// Opaque caller payload (e.g. the live room a factory spawns into).
pub trait HostContext: Send + Sync {
    fn describe(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    /// Receive a value produced by verified code.
    fn accept(&self, produced: Value) -> std::result::Result<(), String>;
}

/// Argument or return value crossing the invocation boundary.
#[derive(Clone)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(ObjectRef),
    /// Placeholder argument bound to the capture sink at call time
    Sink,
    Host(Arc<dyn HostContext>),
}

impl Value {
    /// Whether this value may be passed for a parameter of type `param`.
    pub fn fits(&self, param: &ParamType) -> bool {
        match (self, param) {
            (Value::Int(_), ParamType::Int | ParamType::Long) => true,
            (Value::Float(_), ParamType::Float | ParamType::Double) => true,
            (Value::Bool(_), ParamType::Bool) => true,
            (Value::Str(_), ParamType::Str) => true,
            (Value::Sink, ParamType::Sink) => true,
            (Value::Null, ParamType::Str | ParamType::Named(_)) => true,
            (Value::Object(_) | Value::Host(_), ParamType::Named(_)) => true,
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Sink => "sink",
            Value::Host(_) => "host",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("Unit"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(obj) => write!(f, "Object({}#{})", obj.class, obj.id),
            Value::Sink => f.write_str("Sink"),
            Value::Host(host) => write!(f, "Host({})", host.describe()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) | (Value::Sink, Value::Sink) => {
                true
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A constructor or method resolved on one compiled unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberHandle {
    unit_id: String,
    slot: usize,
    kind: MemberKind,
    name: String,
    params: Vec<ParamType>,
}

impl MemberHandle {
    pub fn new(
        unit_id: impl Into<String>,
        slot: usize,
        kind: MemberKind,
        name: impl Into<String>,
        params: Vec<ParamType>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            slot,
            kind,
            name: name.into(),
            params,
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    /// Module-local index of the member
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn signature(&self) -> String {
        signature(&self.name, &self.params)
    }
}

/// Render `name(t1, t2)`.
pub fn signature(name: &str, params: &[ParamType]) -> String {
    let params: Vec<&str> = params.iter().map(ParamType::wire_name).collect();
    format!("{}({})", name, params.join(", "))
}
