use crate::config::types::{Result, VerifyError};
use crate::core::module::CompiledModule;
use crate::core::native::NativeModule;
use crate::core::types::SourceUnit;
use crate::judge::adapter::{ToolLimits, ToolchainAdapter};
use crate::safety::workspace::Workspace;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a module for one submission; `Err` is reported as compile diagnostics.
pub type NativeFactory =
    Arc<dyn Fn(&SourceUnit) -> std::result::Result<NativeModule, String> + Send + Sync>;

/// In-process toolchain: "compiling" a type runs its registered factory over
/// the submission text.
#[derive(Clone, Default)]
pub struct NativeToolchain {
    factories: HashMap<String, NativeFactory>,
}

impl NativeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, type_name: &str, factory: F) -> Self
    where
        F: Fn(&SourceUnit) -> std::result::Result<NativeModule, String> + Send + Sync + 'static,
    {
        self.factories
            .insert(type_name.to_string(), Arc::new(factory));
        self
    }

    pub fn types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn build(&self, workspace: &Workspace, type_name: &str) -> Result<NativeModule> {
        let factory = self.factories.get(type_name).ok_or_else(|| VerifyError::Compile {
            type_name: type_name.to_string(),
            diagnostics: format!("no native definition registered for {}", type_name),
        })?;
        let path = workspace.source_file().ok_or_else(|| {
            VerifyError::Load(format!("workspace {} holds no source", workspace.run_id()))
        })?;
        let unit = SourceUnit::read(path, type_name)?;
        factory(&unit).map_err(|diagnostics| VerifyError::Compile {
            type_name: type_name.to_string(),
            diagnostics,
        })
    }
}

impl ToolchainAdapter for NativeToolchain {
    fn language(&self) -> &'static str {
        "native"
    }

    fn source_file_name(&self, type_name: &str) -> String {
        format!("{}.src", type_name)
    }

    fn compile_command(&self, _workspace: &Workspace, _type_name: &str) -> Vec<String> {
        Vec::new()
    }

    fn compile(&self, workspace: &Workspace, type_name: &str, _limits: &ToolLimits) -> Result<()> {
        self.build(workspace, type_name).map(|_| ())
    }

    fn load(
        &self,
        workspace: &Workspace,
        type_name: &str,
        _limits: &ToolLimits,
    ) -> Result<Box<dyn CompiledModule>> {
        let module = self
            .build(workspace, type_name)?
            .with_unit_id(workspace.run_id());
        Ok(Box::new(module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::EngineConfig;
    use crate::safety::workspace::WorkspaceManager;

    fn toolchain() -> NativeToolchain {
        NativeToolchain::new().register("Greeter", |unit| {
            if unit.text().contains("class Greeter") {
                Ok(NativeModule::new("Greeter"))
            } else {
                Err("Greeter.src: class Greeter not declared".to_string())
            }
        })
    }

    #[test]
    fn test_compile_reports_factory_diagnostics() {
        let root = std::env::temp_dir().join(format!("dojobox_native_{}", uuid::Uuid::new_v4()));
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        let mut workspace = manager.create_workspace().unwrap();
        workspace
            .create_source_file("Greeter.src", "class Greter {}")
            .unwrap();

        let limits = ToolLimits::from(&EngineConfig::default());
        let err = toolchain().compile(&workspace, "Greeter", &limits).unwrap_err();
        match err {
            VerifyError::Compile { diagnostics, .. } => {
                assert!(diagnostics.contains("not declared"))
            }
            other => panic!("unexpected error: {other}"),
        }
        drop(workspace);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_load_stamps_unit_id() {
        let root = std::env::temp_dir().join(format!("dojobox_native_{}", uuid::Uuid::new_v4()));
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        let mut workspace = manager.create_workspace().unwrap();
        workspace
            .create_source_file("Greeter.src", "class Greeter {}")
            .unwrap();

        let limits = ToolLimits::from(&EngineConfig::default());
        let module = toolchain().load(&workspace, "Greeter", &limits).unwrap();
        assert_eq!(module.unit_id(), workspace.run_id());
        assert_eq!(module.type_name(), "Greeter");
        drop(workspace);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_unregistered_type_fails_compile() {
        let root = std::env::temp_dir().join(format!("dojobox_native_{}", uuid::Uuid::new_v4()));
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        let mut workspace = manager.create_workspace().unwrap();
        workspace.create_source_file("Other.src", "class Other {}").unwrap();

        let limits = ToolLimits::from(&EngineConfig::default());
        assert!(toolchain().compile(&workspace, "Other", &limits).is_err());
        assert_eq!(toolchain().types(), vec!["Greeter"]);
        drop(workspace);
        let _ = std::fs::remove_dir_all(&root);
    }
}
