/// External tool execution with a wall-clock bound
/// Used for compile steps: spawn, drain stdout/stderr on collector threads,
/// poll for exit and kill the child once the limit is exceeded.
use crate::config::types::{Result, VerifyError};
use crate::utils::output::{spawn_collector, OutputIntegrity};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Outcome of one tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub wall_time_ms: u64,
    pub output_integrity: OutputIntegrity,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stderr followed by stdout, trimmed; compilers differ on where they report.
    pub fn diagnostics(&self) -> String {
        let mut text = String::new();
        for part in [self.stderr.trim(), self.stdout.trim()] {
            if part.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(part);
        }
        text
    }
}

/// Run `command` in `workdir`, killing it after `timeout`.
pub fn run_tool(
    command: &[String],
    workdir: &Path,
    timeout: Duration,
    output_limit: usize,
) -> Result<ToolOutput> {
    let Some(program) = command.first() else {
        return Err(VerifyError::Config("empty tool command".to_string()));
    };

    let started = Instant::now();
    let mut child = Command::new(program)
        .args(&command[1..])
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| VerifyError::Process(format!("spawn {}: {}", program, e)))?;

    let stdout_reader = child
        .stdout
        .take()
        .map(|out| spawn_collector(out, output_limit));
    let stderr_reader = child
        .stderr
        .take()
        .map(|err| spawn_collector(err, output_limit));

    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if started.elapsed() > timeout {
                    timed_out = true;
                    log::warn!(
                        "{} exceeded {} ms, killing pid {}",
                        program,
                        timeout.as_millis(),
                        child.id()
                    );
                    let _ = child.kill();
                    break child.wait().ok();
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VerifyError::Process(format!("wait {}: {}", program, e)));
            }
        }
    };

    let mut integrity = OutputIntegrity::Complete;
    let mut join = |reader: Option<std::thread::JoinHandle<(Vec<u8>, OutputIntegrity)>>| {
        let (bytes, stream_integrity) = reader
            .and_then(|r| r.join().ok())
            .unwrap_or((Vec::new(), OutputIntegrity::ReadError));
        if stream_integrity != OutputIntegrity::Complete {
            integrity = stream_integrity;
        }
        String::from_utf8_lossy(&bytes).to_string()
    };
    let stdout = join(stdout_reader);
    let stderr = join(stderr_reader);

    let output = ToolOutput {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        timed_out,
        wall_time_ms: started.elapsed().as_millis() as u64,
        output_integrity: integrity,
    };
    log::debug!(
        "{} finished: exit={:?} timed_out={} wall={}ms",
        program,
        output.exit_code,
        output.timed_out,
        output.wall_time_ms
    );
    Ok(output)
}
