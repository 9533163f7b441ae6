//! ToolContext - execution context for tools

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Execution context for tools - scoped to one workspace
///
/// All relative paths resolve against the workspace root; absolute paths
/// pass through unchanged. The design assumes a trusted workspace - there
/// is no sandbox beyond per-command timeouts.
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root all relative paths resolve against
    pub workspace: PathBuf,

    /// Files read this invocation (edit_file requires a prior read)
    read_files: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            read_files: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Resolve a path: absolute passes through, relative joins the workspace
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Track that a file was read (enables edit validation)
    pub async fn track_read(&self, path: &Path) {
        let mut read_files = self.read_files.lock().await;
        read_files.insert(self.resolve_path(path));
    }

    /// Check if a file was read (required before edit)
    pub async fn was_read(&self, path: &Path) -> bool {
        let read_files = self.read_files.lock().await;
        read_files.contains(&self.resolve_path(path))
    }

    /// Clear read tracking (called at invocation start)
    pub async fn clear_reads(&self) {
        let mut read_files = self.read_files.lock().await;
        read_files.clear();
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext").field("workspace", &self.workspace).finish()
    }
}
