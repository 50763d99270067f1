use crate::config::types::{EngineConfig, Result, VerifyError};
use crate::core::module::CompiledModule;
use crate::exec::executor::run_tool;
use crate::safety::workspace::Workspace;
use std::time::Duration;

/// Bounds applied to toolchain stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolLimits {
    pub build_timeout: Duration,
    pub invoke_timeout: Duration,
    pub output_limit: usize,
}

impl From<&EngineConfig> for ToolLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            build_timeout: config.build_timeout(),
            invoke_timeout: config.invoke_timeout(),
            output_limit: config.output_limit_bytes,
        }
    }
}

/// Toolchain adapter contract for language-specific compile/load stages.
pub trait ToolchainAdapter: Send + Sync {
    fn language(&self) -> &'static str;

    /// File name the submission is written under inside the workspace.
    fn source_file_name(&self, type_name: &str) -> String;

    /// Extra files written next to the submission before compiling.
    fn support_files(&self) -> Vec<(String, &'static str)> {
        Vec::new()
    }

    /// Compiler command line; empty when the language needs no build tool.
    fn compile_command(&self, workspace: &Workspace, type_name: &str) -> Vec<String>;

    /// Compile the workspace sources.
    ///
    /// Runs `compile_command` under the build timeout. A non-zero exit is
    /// `VerifyError::Compile` carrying the tool's diagnostics.
    fn compile(&self, workspace: &Workspace, type_name: &str, limits: &ToolLimits) -> Result<()> {
        let command = self.compile_command(workspace, type_name);
        if command.is_empty() {
            return Ok(());
        }
        let output = run_tool(
            &command,
            workspace.run_dir(),
            limits.build_timeout,
            limits.output_limit,
        )?;
        if output.timed_out {
            return Err(VerifyError::BuildTimeout {
                limit_ms: limits.build_timeout.as_millis() as u64,
            });
        }
        if !output.success() {
            // Workspace paths differ per run; report file names only
            let prefix = format!("{}/", workspace.run_dir().display());
            return Err(VerifyError::Compile {
                type_name: type_name.to_string(),
                diagnostics: output.diagnostics().replace(&prefix, ""),
            });
        }
        Ok(())
    }

    /// Load the compiled type and expose it as a module.
    fn load(
        &self,
        workspace: &Workspace,
        type_name: &str,
        limits: &ToolLimits,
    ) -> Result<Box<dyn CompiledModule>>;
}
