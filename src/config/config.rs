/// Configuration loading from a JSON file plus environment overrides
use crate::config::types::{EngineConfig, Result, VerifyError};
use std::path::{Path, PathBuf};

pub const ENV_WORKSPACE_ROOT: &str = "DOJOBOX_WORKSPACE_ROOT";
pub const ENV_JAVA_HOME: &str = "DOJOBOX_JAVA_HOME";
pub const ENV_BUILD_TIMEOUT_MS: &str = "DOJOBOX_BUILD_TIMEOUT_MS";

impl EngineConfig {
    /// Load configuration from a JSON file. Missing fields keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| VerifyError::Config(format!("Failed to parse config JSON: {}", e)))
    }

    /// Load from `path` when given, otherwise start from defaults, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (injectable for tests).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_WORKSPACE_ROOT) {
            log::debug!("workspace root overridden from environment: {}", root);
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(home) = lookup(ENV_JAVA_HOME) {
            self.java_home = Some(PathBuf::from(home));
        }
        if let Some(raw) = lookup(ENV_BUILD_TIMEOUT_MS) {
            self.build_timeout_ms = raw.trim().parse().map_err(|_| {
                VerifyError::Config(format!(
                    "{} must be an integer number of milliseconds, got {:?}",
                    ENV_BUILD_TIMEOUT_MS, raw
                ))
            })?;
        }
        Ok(())
    }
}
