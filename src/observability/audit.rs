/// Verification audit events
///
/// Every scenario run emits a small, fixed set of JSON events on the
/// `dojobox::audit` log target, correlated by a per-request id and the
/// SHA-256 of the submitted text. An optional append-only audit file receives
/// the same lines.
use crate::config::types::{Result, VerifyError};
use crate::verdict::verdict::FailureKind;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "dojobox::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    ScenarioStart,
    BuildFinished,
    StepOutcome,
    ScenarioEnd,
}

/// Correlation identifiers shared by every event of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationIds {
    pub request_id: String,
    pub scenario: String,
    /// SHA-256 of the source text; empty until the source has been read
    pub source_sha256: String,
}

impl CorrelationIds {
    pub fn new(scenario: &str) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            scenario: scenario.to_string(),
            source_sha256: String::new(),
        }
    }

    pub fn with_source_sha256(mut self, digest: String) -> Self {
        self.source_sha256 = digest;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub timestamp: u64,
    pub correlation: CorrelationIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, correlation: &CorrelationIds) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            correlation: correlation.clone(),
            step: None,
            passed: None,
            failure: None,
            unit_id: None,
            elapsed_ms: None,
        }
    }

    pub fn with_step(mut self, step: &str) -> Self {
        self.step = Some(step.to_string());
        self
    }

    pub fn with_passed(mut self, passed: bool) -> Self {
        self.passed = Some(passed);
        self
    }

    pub fn with_failure(mut self, failure: Option<FailureKind>) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_unit_id(mut self, unit_id: &str) -> Self {
        self.unit_id = Some(unit_id.to_string());
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Append-only audit file
pub struct AuditLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VerifyError::Config(format!("Failed to create audit log directory: {}", e))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| VerifyError::Config(format!("Failed to open audit log: {}", e)))?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            error!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }
}

static AUDIT_LOG: OnceLock<AuditLog> = OnceLock::new();

/// Mirror audit events into `path` for the rest of the process lifetime.
pub fn init_audit_log(path: &Path) -> Result<()> {
    let log = AuditLog::open(path)?;
    if AUDIT_LOG.set(log).is_err() {
        error!("Audit log already initialized");
    } else {
        info!("Audit log at {}", path.display());
    }
    Ok(())
}

pub fn emit(event: AuditEvent) {
    let line = event.to_json_line();
    info!(target: AUDIT_TARGET, "{}", line);
    if let Some(log) = AUDIT_LOG.get() {
        log.write_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_omits_unset_fields() {
        let ids = CorrelationIds::new("test1").with_source_sha256("ab".repeat(32));
        let event = AuditEvent::new(AuditEventType::StepOutcome, &ids)
            .with_step("compile")
            .with_passed(true);
        let json: serde_json::Value = serde_json::from_str(&event.to_json_line()).unwrap();
        assert_eq!(json["event_type"], "StepOutcome");
        assert_eq!(json["step"], "compile");
        assert_eq!(json["correlation"]["scenario"], "test1");
        assert!(json.get("failure").is_none());
        assert!(json.get("unit_id").is_none());
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(
            CorrelationIds::new("a").request_id,
            CorrelationIds::new("a").request_id
        );
    }

    #[test]
    fn test_audit_log_appends_lines() {
        let path = std::env::temp_dir()
            .join(format!("dojobox_audit_{}", Uuid::new_v4()))
            .join("audit.log");
        let log = AuditLog::open(&path).unwrap();
        log.write_line("{\"a\":1}");
        log.write_line("{\"b\":2}");
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
