/// Output capture and bounded collection
///
/// Two ways text reaches a verdict:
/// - `CaptureSink`: an in-memory writer injected into the call (preferred)
/// - `OutputCapture`: a descriptor-level redirect of a process-wide channel,
///   serialized by a process-wide mutex and always restored before returning
use crate::config::types::Result;
use nix::unistd::{close, dup, dup2, pipe};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::FromRawFd;
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread;

/// Output integrity classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputIntegrity {
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "truncated")]
    Truncated,
    #[serde(rename = "read_error")]
    ReadError,
}

impl fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::Truncated => write!(f, "truncated"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
        }
    }
}

/// Read a stream to EOF keeping at most `limit` bytes.
/// Bytes past the limit are drained and dropped so the writer never blocks.
pub fn collect_stream<R: Read>(mut stream: R, limit: usize) -> (Vec<u8>, OutputIntegrity) {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut integrity = OutputIntegrity::Complete;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let remaining = limit.saturating_sub(out.len());
                if n > remaining {
                    out.extend_from_slice(&chunk[..remaining]);
                    integrity = OutputIntegrity::Truncated;
                } else {
                    out.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => {
                integrity = OutputIntegrity::ReadError;
                break;
            }
        }
    }

    (out, integrity)
}

/// Collect a stream on a background thread.
pub fn spawn_collector<R: Read + Send + 'static>(
    stream: R,
    limit: usize,
) -> thread::JoinHandle<(Vec<u8>, OutputIntegrity)> {
    thread::spawn(move || collect_stream(stream, limit))
}

/// Bounded in-memory text sink passed into invocations
#[derive(Debug)]
pub struct CaptureSink {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CaptureSink {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf).to_string()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn integrity(&self) -> OutputIntegrity {
        if self.truncated {
            OutputIntegrity::Truncated
        } else {
            OutputIntegrity::Complete
        }
    }
}

impl Write for CaptureSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let remaining = self.limit.saturating_sub(self.buf.len());
        if data.len() > remaining {
            self.buf.extend_from_slice(&data[..remaining]);
            self.truncated = true;
        } else {
            self.buf.extend_from_slice(data);
        }
        // Report everything as written; overflow is recorded, not surfaced.
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Result of a captured block
#[derive(Debug)]
pub struct Captured<T> {
    /// Block result, or the panic message if the block panicked
    pub outcome: std::result::Result<T, String>,
    pub text: String,
    pub integrity: OutputIntegrity,
}

/// Serializes every redirect of a process-wide descriptor.
static CAPTURE_LOCK: Mutex<()> = Mutex::new(());

/// Scoped redirection of one output descriptor into a buffer
#[derive(Debug, Clone, Copy)]
pub struct OutputCapture {
    target_fd: RawFd,
    limit: usize,
}

impl OutputCapture {
    /// Capture the process standard output
    pub fn stdout(limit: usize) -> Self {
        Self::for_fd(libc::STDOUT_FILENO, limit)
    }

    /// Capture an arbitrary descriptor
    pub fn for_fd(target_fd: RawFd, limit: usize) -> Self {
        Self { target_fd, limit }
    }

    /// Run `block` with the descriptor redirected into a buffer.
    ///
    /// The original destination is restored before this returns, whether the
    /// block returns or panics. A panic is reported in `Captured::outcome`.
    pub fn capture<T, F>(&self, block: F) -> Result<Captured<T>>
    where
        F: FnOnce() -> T,
    {
        let _serial = CAPTURE_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        self.flush_target();

        let (read_fd, write_fd) = pipe()?;
        let reader = unsafe { File::from_raw_fd(read_fd) };
        let collector = spawn_collector(reader, self.limit);

        let redirect = match Redirect::install(self.target_fd, write_fd) {
            Ok(redirect) => redirect,
            Err(e) => {
                // install closed the write end, so the collector sees EOF
                let _ = collector.join();
                return Err(e);
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(block));
        drop(redirect);

        let (bytes, integrity) = collector
            .join()
            .unwrap_or_else(|_| (Vec::new(), OutputIntegrity::ReadError));

        Ok(Captured {
            outcome: outcome.map_err(|payload| panic_message(payload.as_ref())),
            text: String::from_utf8_lossy(&bytes).to_string(),
            integrity,
        })
    }

    fn flush_target(&self) {
        if self.target_fd == libc::STDOUT_FILENO {
            let _ = std::io::stdout().flush();
        }
    }
}

/// Active redirect; restores the saved descriptor on drop
struct Redirect {
    target_fd: RawFd,
    saved_fd: RawFd,
}

impl Redirect {
    /// Point `target_fd` at `write_fd`. Consumes `write_fd` on every path.
    fn install(target_fd: RawFd, write_fd: RawFd) -> Result<Self> {
        let saved_fd = match dup(target_fd) {
            Ok(fd) => fd,
            Err(e) => {
                let _ = close(write_fd);
                return Err(e.into());
            }
        };
        if let Err(e) = dup2(write_fd, target_fd) {
            let _ = close(write_fd);
            let _ = close(saved_fd);
            return Err(e.into());
        }
        let _ = close(write_fd);
        Ok(Self {
            target_fd,
            saved_fd,
        })
    }
}

impl Drop for Redirect {
    fn drop(&mut self) {
        if self.target_fd == libc::STDOUT_FILENO {
            let _ = std::io::stdout().flush();
        }
        if let Err(e) = dup2(self.saved_fd, self.target_fd) {
            log::error!("failed to restore fd {}: {}", self.target_fd, e);
        }
        let _ = close(self.saved_fd);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
