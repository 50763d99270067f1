/// Core configuration and error types for the dojobox engine
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root under which one workspace directory per compilation is allocated
    pub workspace_root: PathBuf,
    /// Toolchain adapter used for submissions ("java")
    pub language: String,
    /// JDK installation; `bin/javac` and `bin/java` are resolved from here when set
    pub java_home: Option<PathBuf>,
    /// Wall-clock bound on one compile invocation
    pub build_timeout_ms: u64,
    /// Wall-clock bound on module start-up and on each member invocation
    pub invoke_timeout_ms: u64,
    /// Cap on captured text per invocation and on collected tool output
    pub output_limit_bytes: usize,
    /// Also redirect the process stdout descriptor around in-process calls
    pub redirect_process_stdout: bool,
    /// Leave workspaces on disk after the compiled unit is dropped
    pub keep_workspaces: bool,
}

impl EngineConfig {
    /// Runtime root directory scoped by effective UID.
    /// Prevents root and non-root runs from colliding on a shared temp dir.
    pub fn runtime_root_dir() -> PathBuf {
        let euid = unsafe { libc::geteuid() };
        std::env::temp_dir().join(format!("dojobox-uid-{}", euid))
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: Self::runtime_root_dir(),
            language: "java".to_string(),
            java_home: None,
            build_timeout_ms: 30_000,
            invoke_timeout_ms: 10_000,
            output_limit_bytes: 1024 * 1024,
            redirect_process_stdout: false,
            keep_workspaces: false,
        }
    }
}

/// How an invocation failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationFailure {
    /// The target ran and raised a failure
    #[serde(rename = "target_failed")]
    TargetFailed,
    /// The target exists but cannot be called (access, abstract type, dead module)
    #[serde(rename = "unreachable")]
    Unreachable,
    /// Wrong number of arguments for the resolved signature
    #[serde(rename = "arity")]
    Arity,
    /// An argument does not fit its declared parameter type
    #[serde(rename = "argument_type")]
    ArgumentType,
    /// The handle belongs to a compiled unit that is no longer current
    #[serde(rename = "stale_handle")]
    StaleHandle,
    /// The call did not return within the invoke timeout
    #[serde(rename = "timeout")]
    Timeout,
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvocationFailure::TargetFailed => "target failed",
            InvocationFailure::Unreachable => "target unreachable",
            InvocationFailure::Arity => "wrong argument count",
            InvocationFailure::ArgumentType => "argument type mismatch",
            InvocationFailure::StaleHandle => "stale member handle",
            InvocationFailure::Timeout => "timed out",
        };
        f.write_str(text)
    }
}

/// Errors raised below the step boundary
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Source unreadable: {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("Source is empty: {0}")]
    EmptySource(PathBuf),

    #[error("Compilation of {type_name} failed:\n{diagnostics}")]
    Compile {
        type_name: String,
        diagnostics: String,
    },

    #[error("Build exceeded {limit_ms} ms and was killed")]
    BuildTimeout { limit_ms: u64 },

    #[error("Loading compiled unit failed: {0}")]
    Load(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    #[error("Invocation failed ({failure}): {detail}")]
    Invocation {
        failure: InvocationFailure,
        detail: String,
    },

    #[error("Output mismatch: expected fragment {expected:?}, got {actual:?}")]
    OutputMismatch { expected: String, actual: String },

    #[error("Required pattern {0:?} not found in source")]
    StructuralPatternMissing(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Probe protocol error: {0}")]
    Protocol(String),
}

impl VerifyError {
    pub fn invocation(failure: InvocationFailure, detail: impl Into<String>) -> Self {
        VerifyError::Invocation {
            failure,
            detail: detail.into(),
        }
    }
}

impl From<nix::errno::Errno> for VerifyError {
    fn from(err: nix::errno::Errno) -> Self {
        VerifyError::Process(err.to_string())
    }
}

/// Result type alias for dojobox operations
pub type Result<T> = std::result::Result<T, VerifyError>;
