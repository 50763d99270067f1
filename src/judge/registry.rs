use crate::config::types::{EngineConfig, Result, VerifyError};
use crate::judge::adapter::ToolchainAdapter;
use crate::judge::languages::java::JavaAdapter;
use std::sync::Arc;

/// Toolchains that can be built from configuration alone.
/// The native toolchain carries code, so callers construct it directly.
pub fn adapter_for(language: &str, config: &EngineConfig) -> Result<Arc<dyn ToolchainAdapter>> {
    match language {
        "java" => Ok(Arc::new(JavaAdapter::new(config.java_home.clone()))),
        _ => Err(VerifyError::Config(format!(
            "unsupported toolchain adapter: {language}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_lookup() {
        let config = EngineConfig::default();
        assert_eq!(adapter_for("java", &config).unwrap().language(), "java");
        assert!(adapter_for("cobol", &config).is_err());
    }
}
