/// Verification entry point
use crate::config::types::{EngineConfig, Result};
use crate::config::validator::validate_config;
use crate::core::types::HostContext;
use crate::exec::builder::Builder;
use crate::exec::invoker::Invoker;
use crate::judge::adapter::{ToolLimits, ToolchainAdapter};
use crate::judge::registry::adapter_for;
use crate::observability::audit::{self, AuditEvent, AuditEventType, CorrelationIds};
use crate::pipeline::scenarios::scenario_for;
use crate::pipeline::{Pipeline, VerificationContext};
use crate::safety::workspace::WorkspaceManager;
use crate::verdict::verdict::{FailureKind, Verdict};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Runs named scenarios against submissions.
///
/// Each call gets its own context and workspaces, so one engine can serve
/// concurrent requests from several threads.
pub struct Engine {
    config: EngineConfig,
    builder: Builder,
    invoker: Invoker,
}

impl Engine {
    /// Engine over the adapter named by `config.language`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let adapter = adapter_for(&config.language, &config)?;
        Self::new(config, adapter)
    }

    pub fn new(config: EngineConfig, adapter: Arc<dyn ToolchainAdapter>) -> Result<Self> {
        let validation = validate_config(&config)?;
        for warning in &validation.warnings {
            log::warn!("config: {}", warning);
        }

        let manager = WorkspaceManager::new(config.workspace_root.clone())?;
        let builder = Builder::new(manager, adapter, ToolLimits::from(&config))
            .keep_workspaces(config.keep_workspaces);
        let invoker = Invoker::new(config.output_limit_bytes)
            .with_process_stdout(config.redirect_process_stdout);
        log::debug!(
            "engine ready: language={} root={}",
            builder.language(),
            config.workspace_root.display()
        );
        Ok(Self {
            config,
            builder,
            invoker,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the scenario registered under `name`. Always returns a verdict.
    pub fn run_scenario(
        &self,
        name: &str,
        source_path: &Path,
        type_name: &str,
        host: Option<Arc<dyn HostContext>>,
    ) -> Verdict {
        match scenario_for(name) {
            Some(pipeline) => self.run_pipeline(&pipeline, source_path, type_name, host),
            None => {
                let correlation = CorrelationIds::new(name);
                audit::emit(AuditEvent::new(AuditEventType::ScenarioStart, &correlation));
                log::warn!("unknown scenario {:?}", name);
                let verdict = Verdict::failed(
                    name,
                    vec![format!("unknown scenario: {}", name)],
                    Some(FailureKind::Internal),
                );
                audit::emit(
                    AuditEvent::new(AuditEventType::ScenarioEnd, &correlation)
                        .with_passed(false)
                        .with_failure(verdict.failure()),
                );
                verdict
            }
        }
    }

    /// Run a caller-assembled pipeline. A pipeline that fails `validate` is
    /// not run and yields a failed verdict.
    pub fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        source_path: &Path,
        type_name: &str,
        host: Option<Arc<dyn HostContext>>,
    ) -> Verdict {
        if let Err(err) = pipeline.validate() {
            log::warn!("rejected pipeline {:?}: {}", pipeline.name(), err);
            return Verdict::failed(
                pipeline.name(),
                vec![format!("invalid pipeline: {}", err)],
                Some(FailureKind::Internal),
            );
        }
        let ctx = VerificationContext::new(source_path, type_name, &self.builder, &self.invoker)
            .with_host(host)
            .with_correlation(CorrelationIds::new(pipeline.name()));
        pipeline.run(ctx)
    }

    /// Remove workspaces older than `max_age` left behind by earlier processes.
    pub fn cleanup_stale_workspaces(&self, max_age: Duration) -> Result<usize> {
        self.builder
            .workspace_manager()
            .cleanup_old_workspaces(max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::VerifyError;
    use crate::judge::languages::native::NativeToolchain;
    use crate::pipeline::steps::{Compile, ReadSource, ReplaceText};

    fn config() -> EngineConfig {
        EngineConfig {
            workspace_root: std::env::temp_dir()
                .join(format!("dojobox_engine_{}", uuid::Uuid::new_v4())),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_unknown_scenario_verdict() {
        let config = config();
        let root = config.workspace_root.clone();
        let engine = Engine::new(config, Arc::new(NativeToolchain::new())).unwrap();
        let verdict = engine.run_scenario("nope", Path::new("X.src"), "X", None);
        assert!(!verdict.is_passed());
        assert_eq!(verdict.messages(), &["unknown scenario: nope".to_string()]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.build_timeout_ms = 0;
        assert!(matches!(
            Engine::new(config, Arc::new(NativeToolchain::new())),
            Err(VerifyError::Config(_))
        ));
    }

    #[test]
    fn test_transform_after_build_is_not_run() {
        let config = config();
        let root = config.workspace_root.clone();
        let engine = Engine::new(config, Arc::new(NativeToolchain::new())).unwrap();
        let pipeline = Pipeline::new("late-replace")
            .step(ReadSource)
            .step(Compile)
            .step(ReplaceText::new("10", "yuppie"));

        let verdict = engine.run_pipeline(&pipeline, Path::new("/nonexistent/X.src"), "X", None);
        assert!(!verdict.is_passed());
        assert_eq!(verdict.messages().len(), 1);
        assert!(verdict.messages()[0].starts_with("invalid pipeline: "));
        assert!(verdict.messages()[0].contains("replace"));
        assert_eq!(verdict.failure(), Some(FailureKind::Internal));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
