/// Subprocess-backed compiled modules
///
/// A probe is a long-lived helper process that loaded the submission and
/// answers `resolve`/`invoke` requests, one JSON line per request. Every reply
/// is awaited under the invoke timeout; a timed out or exited probe is killed
/// and the module refuses further calls.
use crate::config::types::{InvocationFailure, Result, VerifyError};
use crate::core::module::CompiledModule;
use crate::core::types::{MemberHandle, MemberKind, ObjectRef, ParamType, Value};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ProbeReply {
    ok: bool,
    #[serde(default)]
    handle: Option<usize>,
    #[serde(default)]
    value: Option<WireValue>,
    #[serde(default)]
    captured: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireValue {
    Unit,
    Null,
    Bool {
        value: bool,
    },
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    Str {
        value: String,
    },
    Nonfinite {
        value: String,
    },
    Object {
        #[serde(rename = "ref")]
        id: u64,
        class: String,
    },
}

impl WireValue {
    fn into_value(self, unit_id: &str) -> Value {
        match self {
            WireValue::Unit => Value::Unit,
            WireValue::Null => Value::Null,
            WireValue::Bool { value } => Value::Bool(value),
            WireValue::Int { value } => Value::Int(value),
            WireValue::Float { value } => Value::Float(value),
            WireValue::Str { value } => Value::Str(value),
            WireValue::Nonfinite { value } => Value::Float(match value.as_str() {
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ => f64::NAN,
            }),
            WireValue::Object { id, class } => Value::Object(ObjectRef::new(unit_id, id, class)),
        }
    }
}

impl ProbeReply {
    fn into_error(self) -> VerifyError {
        let detail = self.detail;
        match self.error.as_deref() {
            Some("not_found") => VerifyError::MemberNotFound(detail),
            Some("instantiation") => VerifyError::Instantiation(detail),
            Some("target") => VerifyError::invocation(InvocationFailure::TargetFailed, detail),
            Some("unreachable") => VerifyError::invocation(InvocationFailure::Unreachable, detail),
            Some("argument") => VerifyError::invocation(InvocationFailure::ArgumentType, detail),
            Some("arity") => VerifyError::invocation(InvocationFailure::Arity, detail),
            Some("load") => VerifyError::Load(detail),
            other => {
                VerifyError::Protocol(format!("{}: {}", other.unwrap_or("unspecified"), detail))
            }
        }
    }
}

/// Handle on a running probe process
pub struct ProbeModule {
    type_name: String,
    unit_id: String,
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<String>,
    invoke_timeout: Duration,
    /// Set once the process is gone; later calls fail fast
    dead: Option<String>,
}

impl ProbeModule {
    /// Start the probe and wait for it to report that `type_name` loaded.
    pub fn spawn(
        command: &[String],
        workdir: &Path,
        type_name: &str,
        unit_id: &str,
        invoke_timeout: Duration,
    ) -> Result<Self> {
        let Some(program) = command.first() else {
            return Err(VerifyError::Config("empty probe command".to_string()));
        };
        let mut child = Command::new(program)
            .args(&command[1..])
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VerifyError::Load(format!("spawn {}: {}", program, e)))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VerifyError::Load("probe pipes unavailable".to_string()));
            }
        };

        let (tx, replies) = crossbeam_channel::unbounded();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut module = Self {
            type_name: type_name.to_string(),
            unit_id: unit_id.to_string(),
            child,
            stdin,
            replies,
            invoke_timeout,
            dead: None,
        };

        let hello = module.receive().map_err(|e| match e {
            VerifyError::Invocation { detail, .. } => {
                VerifyError::Load(format!("probe for {} did not start: {}", type_name, detail))
            }
            other => other,
        })?;
        if !hello.ok {
            return Err(hello.into_error());
        }
        log::debug!("probe pid {} loaded {}", module.child.id(), type_name);
        Ok(module)
    }

    fn request(&mut self, line: &str) -> Result<ProbeReply> {
        if let Some(reason) = &self.dead {
            return Err(VerifyError::invocation(
                InvocationFailure::Unreachable,
                format!("probe for {} is gone ({})", self.type_name, reason),
            ));
        }
        let sent = writeln!(self.stdin, "{}", line).and_then(|_| self.stdin.flush());
        if let Err(e) = sent {
            self.terminate("stdin closed");
            return Err(VerifyError::invocation(
                InvocationFailure::Unreachable,
                format!("probe for {} stopped reading: {}", self.type_name, e),
            ));
        }
        self.receive()
    }

    fn receive(&mut self) -> Result<ProbeReply> {
        match self.replies.recv_timeout(self.invoke_timeout) {
            Ok(line) => serde_json::from_str(&line)
                .map_err(|e| VerifyError::Protocol(format!("{}: {:?}", e, line))),
            Err(RecvTimeoutError::Timeout) => {
                self.terminate("timed out");
                Err(VerifyError::invocation(
                    InvocationFailure::Timeout,
                    format!("no reply within {} ms", self.invoke_timeout.as_millis()),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.terminate("exited");
                Err(VerifyError::invocation(
                    InvocationFailure::Unreachable,
                    format!("probe for {} exited", self.type_name),
                ))
            }
        }
    }

    fn terminate(&mut self, reason: &str) {
        log::warn!(
            "terminating probe pid {} for {}: {}",
            self.child.id(),
            self.type_name,
            reason
        );
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.dead = Some(reason.to_string());
    }

    fn check_owner(&self, obj: &ObjectRef) -> Result<()> {
        if obj.unit_id() != self.unit_id {
            return Err(VerifyError::invocation(
                InvocationFailure::StaleHandle,
                format!("{}#{} belongs to another unit", obj.class(), obj.id()),
            ));
        }
        Ok(())
    }

    fn encode_arg(&self, arg: &Value) -> Result<String> {
        let token = match arg {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(i) => format!("n:{}", i),
            Value::Float(f) if f.is_nan() => "n:NaN".to_string(),
            Value::Float(f) if f.is_infinite() => {
                if *f > 0.0 { "n:Infinity" } else { "n:-Infinity" }.to_string()
            }
            Value::Float(f) => format!("n:{}", f),
            Value::Str(s) => format!("s:{}", escape(s)),
            Value::Sink => "sink".to_string(),
            Value::Object(obj) => {
                self.check_owner(obj)?;
                format!("r:{}", obj.id())
            }
            Value::Unit | Value::Host(_) => {
                return Err(VerifyError::invocation(
                    InvocationFailure::ArgumentType,
                    format!("{} values cannot be passed to the probe", arg.type_label()),
                ))
            }
        };
        Ok(token)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

impl CompiledModule for ProbeModule {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    fn resolve(
        &mut self,
        kind: MemberKind,
        name: &str,
        params: &[ParamType],
    ) -> Result<MemberHandle> {
        if name.chars().any(char::is_control) {
            return Err(VerifyError::MemberNotFound(format!("{:?}", name)));
        }
        let mut fields = vec!["resolve", kind.as_str(), name];
        fields.extend(params.iter().map(ParamType::wire_name));
        let reply = self.request(&fields.join("\t"))?;
        if !reply.ok {
            return Err(reply.into_error());
        }
        let slot = reply
            .handle
            .ok_or_else(|| VerifyError::Protocol("resolve reply without handle".to_string()))?;
        Ok(MemberHandle::new(
            self.unit_id.clone(),
            slot,
            kind,
            name,
            params.to_vec(),
        ))
    }

    fn invoke(
        &mut self,
        handle: &MemberHandle,
        receiver: Option<&ObjectRef>,
        args: &[Value],
        sink: &mut dyn Write,
    ) -> Result<Value> {
        if handle.unit_id() != self.unit_id {
            return Err(VerifyError::invocation(
                InvocationFailure::StaleHandle,
                format!("{} was resolved on another unit", handle.signature()),
            ));
        }
        for (index, (arg, param)) in args.iter().zip(handle.params()).enumerate() {
            if !arg.fits(param) {
                return Err(VerifyError::invocation(
                    InvocationFailure::ArgumentType,
                    format!("argument {} is {} but expects {}", index, arg.type_label(), param),
                ));
            }
        }

        let receiver_field = match receiver {
            Some(obj) => {
                self.check_owner(obj)?;
                obj.id().to_string()
            }
            None => "-".to_string(),
        };
        let mut fields = vec!["invoke".to_string(), handle.slot().to_string(), receiver_field];
        for arg in args {
            fields.push(self.encode_arg(arg)?);
        }

        let reply = self.request(&fields.join("\t"))?;
        sink.write_all(reply.captured.as_bytes())?;
        if !reply.ok {
            return Err(reply.into_error());
        }
        let unit_id = self.unit_id.clone();
        Ok(reply
            .value
            .map(|v| v.into_value(&unit_id))
            .unwrap_or(Value::Unit))
    }
}

impl Drop for ProbeModule {
    fn drop(&mut self) {
        if self.dead.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
