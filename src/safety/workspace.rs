/// Run-scoped workspaces
/// One uniquely named directory per compilation so repeated or concurrent
/// builds of the same type name never see each other's files or classes.
use crate::config::types::{Result, VerifyError};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Isolated scratch directory owned by one compiled unit
#[derive(Debug)]
pub struct Workspace {
    /// Unique run ID, also the directory name
    run_id: String,
    /// Run-specific workspace directory
    run_dir: PathBuf,
    /// Submission source written into the workspace (if any)
    source_file: Option<PathBuf>,
    /// Skip removal on drop
    keep: bool,
}

impl Workspace {
    /// Create new workspace for a run
    pub fn new(base_dir: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let run_dir = base_dir.join(&run_id);

        fs::create_dir_all(&run_dir).map_err(|e| {
            VerifyError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create workspace directory {}: {}",
                    run_dir.display(),
                    e
                ),
            ))
        })?;

        log::debug!("allocated workspace {}", run_dir.display());
        Ok(Self {
            run_id,
            run_dir,
            source_file: None,
            keep: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Leave the directory on disk when this workspace is dropped
    pub fn keep_on_drop(&mut self, keep: bool) {
        self.keep = keep;
    }

    /// Write the submission under `file_name` and remember it as the source file
    pub fn create_source_file(&mut self, file_name: &str, content: &str) -> Result<PathBuf> {
        let source_path = self.write_file(file_name, content)?;
        self.source_file = Some(source_path.clone());
        Ok(source_path)
    }

    /// Write an auxiliary file into the workspace
    pub fn write_file(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
            return Err(VerifyError::Config(format!(
                "workspace file name must be a plain file name: {:?}",
                file_name
            )));
        }
        let path = self.run_dir.join(file_name);
        fs::write(&path, content).map_err(|e| {
            VerifyError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write file {}: {}", path.display(), e),
            ))
        })?;
        Ok(path)
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Remove the workspace directory (idempotent)
    pub fn cleanup(&self) -> Result<()> {
        if self.run_dir.exists() {
            fs::remove_dir_all(&self.run_dir)?;
        }
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            log::info!("keeping workspace {}", self.run_dir.display());
            return;
        }
        if let Err(e) = self.cleanup() {
            log::warn!(
                "Failed to remove workspace {}: {}",
                self.run_dir.display(),
                e
            );
        }
    }
}

/// Allocates workspaces under one root and sweeps stale ones
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            VerifyError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create workspace base directory {}: {}",
                    base_dir.display(),
                    e
                ),
            ))
        })?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create_workspace(&self) -> Result<Workspace> {
        Workspace::new(&self.base_dir)
    }

    /// Remove workspace directories older than `max_age`.
    /// Used to reclaim workspaces left behind by killed processes.
    pub fn cleanup_old_workspaces(&self, max_age: std::time::Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = std::time::SystemTime::now();

        if !self.base_dir.exists() {
            return Ok(0);
        }

        let entries = fs::read_dir(&self.base_dir).map_err(|e| {
            VerifyError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to read workspace directory {}: {}",
                    self.base_dir.display(),
                    e
                ),
            ))
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            // Only directories this manager could have created
            let is_run_dir = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| Uuid::parse_str(n).is_ok())
                .unwrap_or(false);
            if !is_run_dir {
                continue;
            }

            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to get modified time for {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = match now.duration_since(modified) {
                Ok(d) => d,
                Err(_) => continue, // Future timestamp, skip
            };

            if age >= max_age {
                log::info!("Cleaning up old workspace: {}", path.display());
                if let Err(e) = fs::remove_dir_all(&path) {
                    log::warn!("Failed to remove old workspace {}: {}", path.display(), e);
                } else {
                    cleaned += 1;
                }
            }
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dojobox_test_{}_{}", tag, Uuid::new_v4()))
    }

    #[test]
    fn test_workspace_creation_and_drop_cleanup() {
        let root = temp_root("workspace");
        let manager = WorkspaceManager::new(root.clone()).unwrap();

        let workspace = manager.create_workspace().unwrap();
        let run_dir = workspace.run_dir().to_path_buf();
        assert!(run_dir.exists());

        drop(workspace);
        assert!(!run_dir.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_workspaces_are_unique() {
        let root = temp_root("unique");
        let manager = WorkspaceManager::new(root.clone()).unwrap();

        let a = manager.create_workspace().unwrap();
        let b = manager.create_workspace().unwrap();
        assert_ne!(a.run_id(), b.run_id());
        assert_ne!(a.run_dir(), b.run_dir());

        drop(a);
        drop(b);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_source_file_written() {
        let root = temp_root("files");
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        let mut workspace = manager.create_workspace().unwrap();

        let source = workspace
            .create_source_file("Calc.java", "public class Calc {}")
            .unwrap();
        assert_eq!(fs::read_to_string(&source).unwrap(), "public class Calc {}");
        assert_eq!(workspace.source_file(), Some(source.as_path()));

        assert!(workspace.write_file("../escape.txt", "x").is_err());

        workspace.cleanup().unwrap();
        assert!(!source.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_keep_on_drop() {
        let root = temp_root("keep");
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        let mut workspace = manager.create_workspace().unwrap();
        workspace.keep_on_drop(true);
        let run_dir = workspace.run_dir().to_path_buf();

        drop(workspace);
        assert!(run_dir.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_cleanup_old_workspaces_sweeps_only_run_dirs() {
        let root = temp_root("sweep");
        let manager = WorkspaceManager::new(root.clone()).unwrap();

        let mut workspace = manager.create_workspace().unwrap();
        workspace.keep_on_drop(true);
        let run_dir = workspace.run_dir().to_path_buf();
        drop(workspace);

        let unrelated = root.join("not-a-workspace");
        fs::create_dir_all(&unrelated).unwrap();

        let cleaned = manager.cleanup_old_workspaces(Duration::from_secs(0)).unwrap();
        assert_eq!(cleaned, 1);
        assert!(!run_dir.exists());
        assert!(unrelated.exists());

        let _ = fs::remove_dir_all(&root);
    }
}
