// Verification latency benchmark
// Measures end-to-end scenario latency through the library entry point
// Native toolchain isolates engine overhead; the Java run adds javac and JVM startup

use dojobox::core::native::NativeModule;
use dojobox::core::types::{ParamType, Value};
use dojobox::judge::languages::native::NativeToolchain;
use dojobox::{Engine, EngineConfig};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ITERATIONS: usize = 100;
const WARMUP_ITERATIONS: usize = 10;
const JAVA_ITERATIONS: usize = 10;

const CALCULATOR: &str = r#"
import java.io.PrintWriter;

public class Calculator {
    public static void testExpectedOutput7(PrintWriter out) {
        out.println("Die Summe ist: " + (3 + 4));
    }

    public static void testExpectedOutput8(PrintWriter out) {
        out.println("Die dritte Zahl ist: " + 8);
    }
}
"#;

struct LatencyStats {
    p50: Duration,
    p95: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();
        let sum: Duration = samples.iter().sum();

        Self {
            p50: samples[(len as f64 * 0.50) as usize],
            p95: samples[((len as f64 * 0.95) as usize).min(len - 1)],
            min: samples[0],
            max: samples[len - 1],
            mean: sum / len as u32,
        }
    }

    fn print(&self, label: &str) {
        println!("\n=== {} ===", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

fn native_toolchain() -> NativeToolchain {
    NativeToolchain::new().register("Calculator", |_| {
        Ok(NativeModule::new("Calculator")
            .static_method("testExpectedOutput7", vec![ParamType::Sink], |_, out| {
                writeln!(out, "Die Summe ist: 7").map_err(|e| e.to_string())?;
                Ok(Value::Unit)
            })
            .static_method("testExpectedOutput8", vec![ParamType::Sink], |_, out| {
                writeln!(out, "Die dritte Zahl ist: 8").map_err(|e| e.to_string())?;
                Ok(Value::Unit)
            }))
    })
}

fn measure(engine: &Engine, source: &Path, warmup: usize, iterations: usize) -> LatencyStats {
    for _ in 0..warmup {
        let _ = engine.run_scenario("test1", source, "Calculator", None);
    }

    let mut samples = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let start = Instant::now();
        let verdict = engine.run_scenario("test1", source, "Calculator", None);
        samples.push(start.elapsed());
        if !verdict.is_passed() {
            eprintln!("unexpected verdict:\n{}", verdict.render());
            std::process::exit(1);
        }
    }
    LatencyStats::from_samples(samples)
}

fn jdk_available() -> bool {
    Command::new("javac")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn main() {
    println!("=== dojobox verification latency ===");
    let dir = std::env::temp_dir().join(format!("dojobox_bench_{}", std::process::id()));
    let source = dir.join("Calculator.java");
    if let Err(e) = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&source, CALCULATOR)) {
        eprintln!("failed to prepare {}: {}", dir.display(), e);
        std::process::exit(1);
    }
    let config = EngineConfig {
        workspace_root: dir.join("workspaces"),
        language: "native".to_string(),
        ..EngineConfig::default()
    };

    let native = match Engine::new(config.clone(), Arc::new(native_toolchain())) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("engine setup failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);
    measure(&native, &source, WARMUP_ITERATIONS, ITERATIONS).print("test1 / native");

    if jdk_available() {
        let java_config = EngineConfig {
            language: "java".to_string(),
            ..config
        };
        match Engine::from_config(java_config) {
            Ok(engine) => {
                measure(&engine, &source, 1, JAVA_ITERATIONS).print("test1 / java");
            }
            Err(e) => eprintln!("java engine unavailable: {}", e),
        }
    } else {
        println!("\njavac not found, skipping java run");
    }
    let _ = std::io::stdout().flush();
    let _ = std::fs::remove_dir_all(&dir);
}
