#![allow(dead_code)]

use dojobox::core::native::NativeModule;
use dojobox::core::types::{HostContext, ParamType, SourceUnit, Value};
use dojobox::judge::languages::native::NativeToolchain;
use dojobox::{Engine, EngineConfig};
use std::any::Any;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const CALCULATOR_OK: &str = r#"
public class Calculator {
    public static void testExpectedOutput7(PrintWriter out) {
        out.println("Die Summe ist: 7");
    }

    public static void testExpectedOutput8(PrintWriter out) {
        out.println("Die dritte Zahl ist: 8");
    }
}
"#;

pub const CUBOID_OK: &str = r#"
public class Cuboid {
    private final float length, width, height;
    public Cuboid(float length, float width, float height) { ... }
    public double calculateArea() { ... }
    public double calculatePerimeter() { ... }
    public double calculateVolume() { ... }
}
"#;

pub const FACTORY_OK: &str = r#"
public class MonsterFactory {
    public MonsterFactory(Room room) { this.room = room; }
    public Monster spawnMonster(String texture, int hp, float speed) { ... }
}
"#;

/// Declares `class <type_name>` somewhere in the text
fn declares(unit: &SourceUnit) -> Result<(), String> {
    let decl = format!("class {}", unit.declared_type_name());
    if unit.text().contains(&decl) {
        Ok(())
    } else {
        Err(format!(
            "{}.java:1: error: class {} not declared",
            unit.declared_type_name(),
            unit.declared_type_name()
        ))
    }
}

/// Rejects identifiers the fixture language does not know
fn known_symbols(unit: &SourceUnit) -> Result<(), String> {
    if unit.text().contains("yuppie") {
        Err("error: cannot find symbol: yuppie".to_string())
    } else {
        Ok(())
    }
}

/// String literals passed to `println`, in source order
fn printed_literals(text: &str) -> Vec<String> {
    text.split("println(\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}

struct Calculator;

fn calculator(unit: &SourceUnit) -> Result<NativeModule, String> {
    declares(unit)?;
    known_symbols(unit)?;
    let lines = printed_literals(unit.text());
    let mut module = NativeModule::new("Calculator").constructor(vec![], |_| Ok(Calculator));
    for (index, &method) in ["testExpectedOutput7", "testExpectedOutput8"].iter().enumerate() {
        if !unit.text().contains(method) {
            continue;
        }
        let line = lines.get(index).cloned().unwrap_or_default();
        module = module.static_method(method, vec![ParamType::Sink], move |_, out| {
            writeln!(out, "{}", line).map_err(|e| e.to_string())?;
            Ok(Value::Unit)
        });
    }
    Ok(module)
}

struct Cuboid {
    l: f64,
    w: f64,
    h: f64,
}

fn cuboid(unit: &SourceUnit) -> Result<NativeModule, String> {
    declares(unit)?;
    let top_only = unit.text().contains("length * width;");
    let dims = vec![ParamType::Float, ParamType::Float, ParamType::Float];
    let module = NativeModule::new("Cuboid")
        .constructor(dims, |args| {
            let mut it = args.iter().map(|v| v.as_f64().unwrap_or(0.0));
            Ok(Cuboid {
                l: it.next().unwrap_or(0.0),
                w: it.next().unwrap_or(0.0),
                h: it.next().unwrap_or(0.0),
            })
        })
        .method("calculateArea", vec![], move |c: &mut Cuboid, _, _| {
            let area = if top_only {
                c.l * c.w
            } else {
                2.0 * (c.l * c.w + c.l * c.h + c.w * c.h)
            };
            Ok(Value::Float(area))
        })
        .method("calculatePerimeter", vec![], |c: &mut Cuboid, _, _| {
            Ok(Value::Float(4.0 * (c.l + c.w + c.h)))
        })
        .method("calculateVolume", vec![], |c: &mut Cuboid, _, _| {
            Ok(Value::Float(c.l * c.w * c.h))
        });
    Ok(module)
}

struct MonsterFactory {
    room: Option<String>,
}

fn monster_factory(unit: &SourceUnit) -> Result<NativeModule, String> {
    declares(unit)?;
    let returns_null = unit.text().contains("return null;");
    let module = NativeModule::new("MonsterFactory")
        .constructor(vec![ParamType::named("Room")], |args| {
            let room = match &args[0] {
                Value::Host(host) => Some(host.describe()),
                _ => None,
            };
            Ok(MonsterFactory { room })
        })
        .method(
            "spawnMonster",
            vec![ParamType::Str, ParamType::Int, ParamType::Float],
            move |factory: &mut MonsterFactory, args, _| {
                if returns_null {
                    return Ok(Value::Null);
                }
                let texture = args[0].as_str().unwrap_or_default();
                Ok(Value::Str(format!(
                    "Monster[{}] in {}",
                    texture,
                    factory.room.as_deref().unwrap_or("nowhere")
                )))
            },
        );
    Ok(module)
}

pub fn toolchain() -> NativeToolchain {
    NativeToolchain::new()
        .register("Calculator", calculator)
        .register("Cuboid", cuboid)
        .register("MonsterFactory", monster_factory)
}

/// Host room that collects spawned entities
#[derive(Default)]
pub struct Room {
    pub entities: Mutex<Vec<Value>>,
}

impl HostContext for Room {
    fn describe(&self) -> String {
        "Room".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn accept(&self, produced: Value) -> Result<(), String> {
        match produced {
            Value::Null | Value::Unit => Err("nothing to place".to_string()),
            value => {
                self.entities
                    .lock()
                    .map_err(|e| e.to_string())?
                    .push(value);
                Ok(())
            }
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub engine: Engine,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            workspace_root: dir.path().join("workspaces"),
            language: "native".to_string(),
            ..EngineConfig::default()
        };
        let engine = Engine::new(config, Arc::new(toolchain())).unwrap();
        Self { dir, engine }
    }

    pub fn write_source(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    pub fn workspace_root(&self) -> &Path {
        &self.engine.config().workspace_root
    }

    /// Workspaces still present under the root
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.workspace_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
