/// Builder: source text to a loaded, workspace-scoped compiled unit
use crate::config::types::{Result, VerifyError};
use crate::core::module::CompiledModule;
use crate::core::types::{MemberHandle, MemberKind, ParamType, SourceUnit};
use crate::judge::adapter::{ToolLimits, ToolchainAdapter};
use crate::safety::workspace::{Workspace, WorkspaceManager};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// A loaded artifact and the workspace it was built in.
///
/// Field order matters: the module (and any process behind it) is dropped
/// before the workspace directory is removed.
pub struct CompiledUnit {
    module: Box<dyn CompiledModule>,
    type_name: String,
    workspace: Workspace,
}

impl CompiledUnit {
    /// Workspace id; also stamped on every handle resolved from this unit
    pub fn id(&self) -> &str {
        self.workspace.run_id()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn workspace_dir(&self) -> &Path {
        self.workspace.run_dir()
    }

    pub(crate) fn module_mut(&mut self) -> &mut dyn CompiledModule {
        self.module.as_mut()
    }

    /// Look up a constructor or method by exact name and parameter types.
    pub fn resolve(
        &mut self,
        kind: MemberKind,
        name: &str,
        params: &[ParamType],
    ) -> Result<MemberHandle> {
        let handle = self.module.resolve(kind, name, params)?;
        log::debug!("resolved {} {} on {}", kind.as_str(), handle.signature(), self.id());
        Ok(handle)
    }
}

impl std::fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("id", &self.id())
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Writes a submission into a fresh workspace, compiles and loads it
pub struct Builder {
    manager: WorkspaceManager,
    adapter: Arc<dyn ToolchainAdapter>,
    limits: ToolLimits,
    keep_workspaces: bool,
}

impl Builder {
    pub fn new(manager: WorkspaceManager, adapter: Arc<dyn ToolchainAdapter>, limits: ToolLimits) -> Self {
        Self {
            manager,
            adapter,
            limits,
            keep_workspaces: false,
        }
    }

    pub fn keep_workspaces(mut self, keep: bool) -> Self {
        self.keep_workspaces = keep;
        self
    }

    pub fn language(&self) -> &'static str {
        self.adapter.language()
    }

    pub fn workspace_manager(&self) -> &WorkspaceManager {
        &self.manager
    }

    pub fn build(&self, source: &SourceUnit) -> Result<CompiledUnit> {
        let type_name = source.declared_type_name();
        if !is_type_name(type_name) {
            return Err(VerifyError::Compile {
                type_name: type_name.to_string(),
                diagnostics: format!("{:?} is not a valid type name", type_name),
            });
        }

        let mut workspace = self.manager.create_workspace()?;
        workspace.keep_on_drop(self.keep_workspaces);
        for (name, content) in self.adapter.support_files() {
            workspace.write_file(&name, content)?;
        }
        workspace.create_source_file(&self.adapter.source_file_name(type_name), source.text())?;

        let started = Instant::now();
        self.adapter.compile(&workspace, type_name, &self.limits)?;
        log::debug!(
            "compiled {} in {} ({} ms)",
            type_name,
            workspace.run_id(),
            started.elapsed().as_millis()
        );

        let module = self.adapter.load(&workspace, type_name, &self.limits)?;
        Ok(CompiledUnit {
            module,
            type_name: type_name.to_string(),
            workspace,
        })
    }
}

fn is_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::EngineConfig;
    use crate::core::native::NativeModule;
    use crate::judge::languages::native::NativeToolchain;

    fn builder(root: &Path) -> Builder {
        let toolchain = NativeToolchain::new().register("Greeter", |unit| {
            if unit.text().contains("class Greeter") {
                Ok(NativeModule::new("Greeter").static_method("hello", vec![], |_, _| {
                    Ok(crate::core::types::Value::Unit)
                }))
            } else {
                Err("class Greeter not declared".to_string())
            }
        });
        Builder::new(
            WorkspaceManager::new(root.to_path_buf()).unwrap(),
            Arc::new(toolchain),
            ToolLimits::from(&EngineConfig::default()),
        )
    }

    fn temp_root() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dojobox_builder_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_each_build_gets_its_own_workspace() {
        let root = temp_root();
        let builder = builder(&root);
        let source = SourceUnit::new("Greeter.src", "class Greeter {}", "Greeter").unwrap();

        let a = builder.build(&source).unwrap();
        let b = builder.build(&source).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.workspace_dir().join("Greeter.src").exists());

        let dir = a.workspace_dir().to_path_buf();
        drop(a);
        assert!(!dir.exists());
        drop(b);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_handles_carry_unit_identity() {
        let root = temp_root();
        let builder = builder(&root);
        let source = SourceUnit::new("Greeter.src", "class Greeter {}", "Greeter").unwrap();
        let mut unit = builder.build(&source).unwrap();
        let handle = unit.resolve(MemberKind::Method, "hello", &[]).unwrap();
        assert_eq!(handle.unit_id(), unit.id());
        drop(unit);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_compile_failure_surfaces() {
        let root = temp_root();
        let builder = builder(&root);
        let source = SourceUnit::new("Greeter.src", "class Nope {}", "Greeter").unwrap();
        assert!(matches!(
            builder.build(&source).unwrap_err(),
            VerifyError::Compile { .. }
        ));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_type_name_validation() {
        assert!(is_type_name("Calculator"));
        assert!(is_type_name("Room_8"));
        assert!(!is_type_name("../Evil"));
        assert!(!is_type_name("8Ball"));
        assert!(!is_type_name(""));
    }
}
