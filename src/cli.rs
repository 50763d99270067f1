use crate::config::types::EngineConfig;
use crate::engine::Engine;
use crate::judge::languages::java::JavaAdapter;
use crate::observability::audit::init_audit_log;
use crate::pipeline::scenarios::{scenario_for, scenario_names};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Compile, load and check learner submissions", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Append audit events to this file
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario against a source file
    Verify {
        /// Scenario name (see `scenarios`)
        #[arg(long)]
        scenario: String,
        /// Path to the submission
        #[arg(long)]
        source: PathBuf,
        /// Type the submission must declare
        #[arg(long = "type")]
        type_name: String,
        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the scenario catalog
    Scenarios,
    /// Remove stale workspaces under the workspace root
    Cleanup {
        /// Minimum age in seconds
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
    /// Check that javac and java are runnable
    CheckDeps {
        /// Verbose output showing detailed version information
        #[arg(long)]
        verbose: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    if let Some(path) = &cli.audit_log {
        init_audit_log(path).context("failed to open audit log")?;
    }
    let config = EngineConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Verify {
            scenario,
            source,
            type_name,
            json,
        } => {
            let engine = Engine::from_config(config)?;
            let verdict = engine.run_scenario(&scenario, &source, &type_name, None);
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                println!("{}", verdict.render());
                println!(
                    "{}: {}",
                    verdict.scenario_name(),
                    if verdict.is_passed() { "PASSED" } else { "FAILED" }
                );
            }
            if !verdict.is_passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Scenarios => {
            for name in scenario_names() {
                let steps = scenario_for(name)
                    .map(|p| p.step_names().join(" -> "))
                    .unwrap_or_default();
                println!("{:<14} {}", name, steps);
            }
            Ok(())
        }
        Commands::Cleanup { max_age_secs } => {
            let engine = Engine::from_config(config)?;
            let cleaned = engine.cleanup_stale_workspaces(Duration::from_secs(max_age_secs))?;
            println!(
                "Removed {} stale workspace(s) under {}",
                cleaned,
                engine.config().workspace_root.display()
            );
            Ok(())
        }
        Commands::CheckDeps { verbose } => check_java_dependencies(&config, verbose),
    }
}

fn check_java_dependencies(config: &EngineConfig, verbose: bool) -> Result<()> {
    use std::process::Command;

    let adapter = JavaAdapter::new(config.java_home.clone());
    let mut all_ok = true;

    for tool in ["javac", "java"] {
        let program = adapter.tool(tool);
        match Command::new(&program).arg("-version").output() {
            Ok(output) if output.status.success() => {
                let version = if !output.stdout.is_empty() {
                    String::from_utf8_lossy(&output.stdout)
                } else {
                    String::from_utf8_lossy(&output.stderr)
                }
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
                println!("{} - OK", tool);
                if verbose {
                    println!("  {} -> {}", program, version);
                }
            }
            Ok(_) => {
                all_ok = false;
                println!("{} - FAILED", tool);
                if verbose {
                    println!("  {} exited with an error", program);
                }
            }
            Err(_) => {
                all_ok = false;
                println!("{} - MISSING", tool);
                if verbose {
                    println!("  {} -> NOT FOUND", program);
                }
            }
        }
    }

    if all_ok {
        println!("Java toolchain ready");
        Ok(())
    } else {
        println!("Install a JDK (e.g. sudo apt install openjdk-17-jdk) or set java_home / DOJOBOX_JAVA_HOME");
        std::process::exit(1);
    }
}
