use crate::config::types::Result;
use crate::core::module::CompiledModule;
use crate::core::probe::ProbeModule;
use crate::judge::adapter::{ToolLimits, ToolchainAdapter};
use crate::safety::workspace::Workspace;
use std::path::PathBuf;

const PROBE_CLASS: &str = "DojoProbe";
const PROBE_SOURCE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/java/DojoProbe.java"
));

/// javac + a reflection probe running on `java`
#[derive(Debug, Clone, Default)]
pub struct JavaAdapter {
    java_home: Option<PathBuf>,
}

impl JavaAdapter {
    pub fn new(java_home: Option<PathBuf>) -> Self {
        Self { java_home }
    }

    /// `$JAVA_HOME/bin/<tool>` when a home is configured, else the bare name for PATH lookup.
    pub fn tool(&self, name: &str) -> String {
        match &self.java_home {
            Some(home) => home.join("bin").join(name).to_string_lossy().to_string(),
            None => name.to_string(),
        }
    }

    fn probe_command(&self, workspace: &Workspace, type_name: &str) -> Vec<String> {
        vec![
            self.tool("java"),
            "-Xss1m".to_string(),
            "-XX:+UseSerialGC".to_string(),
            "-Dfile.encoding=UTF-8".to_string(),
            "-cp".to_string(),
            workspace.run_dir().to_string_lossy().to_string(),
            PROBE_CLASS.to_string(),
            type_name.to_string(),
        ]
    }
}

impl ToolchainAdapter for JavaAdapter {
    fn language(&self) -> &'static str {
        "java"
    }

    fn source_file_name(&self, type_name: &str) -> String {
        format!("{}.java", type_name)
    }

    fn support_files(&self) -> Vec<(String, &'static str)> {
        vec![(format!("{}.java", PROBE_CLASS), PROBE_SOURCE)]
    }

    fn compile_command(&self, workspace: &Workspace, type_name: &str) -> Vec<String> {
        let dir = workspace.run_dir();
        vec![
            self.tool("javac"),
            "-encoding".to_string(),
            "UTF-8".to_string(),
            "-nowarn".to_string(),
            "-d".to_string(),
            dir.to_string_lossy().to_string(),
            dir.join(self.source_file_name(type_name))
                .to_string_lossy()
                .to_string(),
            dir.join(format!("{}.java", PROBE_CLASS))
                .to_string_lossy()
                .to_string(),
        ]
    }

    fn load(
        &self,
        workspace: &Workspace,
        type_name: &str,
        limits: &ToolLimits,
    ) -> Result<Box<dyn CompiledModule>> {
        let module = ProbeModule::spawn(
            &self.probe_command(workspace, type_name),
            workspace.run_dir(),
            type_name,
            workspace.run_id(),
            limits.invoke_timeout,
        )?;
        Ok(Box::new(module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::workspace::WorkspaceManager;

    #[test]
    fn test_tool_resolution() {
        assert_eq!(JavaAdapter::default().tool("javac"), "javac");
        let adapter = JavaAdapter::new(Some(PathBuf::from("/opt/jdk")));
        assert_eq!(adapter.tool("java"), "/opt/jdk/bin/java");
    }

    #[test]
    fn test_compile_command_builds_submission_and_probe() {
        let root = std::env::temp_dir().join(format!("dojobox_java_{}", uuid::Uuid::new_v4()));
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        let workspace = manager.create_workspace().unwrap();

        let command = JavaAdapter::default().compile_command(&workspace, "Calculator");
        assert_eq!(command[0], "javac");
        assert!(command.iter().any(|a| a.ends_with("Calculator.java")));
        assert!(command.iter().any(|a| a.ends_with("DojoProbe.java")));

        drop(workspace);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_probe_source_is_embedded() {
        let files = JavaAdapter::default().support_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "DojoProbe.java");
        assert!(files[0].1.contains("public final class DojoProbe"));
    }
}
