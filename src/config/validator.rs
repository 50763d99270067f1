// Config validation
// Startup validation fails fast on settings the engine cannot honor and
// warns on settings that will likely produce spurious failures.

use crate::config::types::{EngineConfig, Result, VerifyError};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate config at startup. Errors are fatal, warnings are returned.
pub fn validate_config(config: &EngineConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::default();

    validate_limits(config, &mut result);
    validate_toolchain(config, &mut result);

    if !result.is_valid() {
        return Err(VerifyError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_limits(config: &EngineConfig, result: &mut ValidationResult) {
    if config.build_timeout_ms == 0 {
        result.add_error("build_timeout_ms cannot be zero".to_string());
    } else if config.build_timeout_ms < 1000 {
        result.add_warning(format!(
            "build_timeout_ms {} is very low (< 1s), compiles may be killed",
            config.build_timeout_ms
        ));
    }

    if config.invoke_timeout_ms == 0 {
        result.add_error("invoke_timeout_ms cannot be zero".to_string());
    } else if config.invoke_timeout_ms < 1000 {
        result.add_warning(format!(
            "invoke_timeout_ms {} is very low (< 1s), probe start-up may time out",
            config.invoke_timeout_ms
        ));
    }

    if config.output_limit_bytes == 0 {
        result.add_error("output_limit_bytes cannot be zero".to_string());
    }
}

fn validate_toolchain(config: &EngineConfig, result: &mut ValidationResult) {
    if config.language.trim().is_empty() {
        result.add_error("language cannot be empty".to_string());
    }

    if let Some(home) = &config.java_home {
        if !home.join("bin").is_dir() {
            result.add_warning(format!(
                "java_home {} has no bin directory; javac and java will not be found there",
                home.display()
            ));
        }
    }

    if config.keep_workspaces {
        result.add_warning("keep_workspaces is set; workspaces will accumulate".to_string());
    }
}
