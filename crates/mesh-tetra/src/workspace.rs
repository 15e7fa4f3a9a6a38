//! Per-job scratch directories.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::{TetraError, TetraResult};

/// Name of the default base directory under the system temp dir.
pub const DEFAULT_BASE_DIR_NAME: &str = "mesh-tetra";

/// What happens to a workspace when its job ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Remove the directory and everything in it.
    #[default]
    Delete,
    /// Leave the files for inspection.
    Keep,
}

impl CleanupPolicy {
    pub fn from_keep_flag(keep: bool) -> Self {
        if keep {
            CleanupPolicy::Keep
        } else {
            CleanupPolicy::Delete
        }
    }
}

/// Default base directory: `<system temp>/mesh-tetra`.
pub fn default_base_dir() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_BASE_DIR_NAME)
}

/// A uniquely named scratch directory for one job.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    destroyed: bool,
}

impl Workspace {
    /// Create `base_dir` if needed, then a fresh child directory named after
    /// the local time (`YYYYmmdd_HHMMSS_mmm`). A taken name gets a `_1`,
    /// `_2`, ... suffix.
    pub fn create(base_dir: &Path) -> TetraResult<Self> {
        fs::create_dir_all(base_dir).map_err(|e| TetraError::WorkspaceCreate {
            path: base_dir.to_path_buf(),
            source: e,
        })?;

        let stem = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                stem.clone()
            } else {
                format!("{}_{}", stem, attempt)
            };
            let path = base_dir.join(name);
            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!(target: "mesh_tetra::io", path = %path.display(), "Workspace created");
                    return Ok(Self {
                        path,
                        destroyed: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(TetraError::WorkspaceCreate { path, source: e }),
            }
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Whether [`destroy`](Self::destroy) already ran.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Recursively remove the directory. Calling it again is a no-op.
    pub fn destroy(&mut self) -> std::io::Result<()> {
        if self.destroyed {
            return Ok(());
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.destroyed = true;
        debug!(target: "mesh_tetra::io", path = %self.path.display(), "Workspace removed");
        Ok(())
    }

    /// Apply a cleanup policy. Failures are logged and returned as a message,
    /// never as an error.
    pub fn finish(&mut self, policy: CleanupPolicy) -> Option<String> {
        match policy {
            CleanupPolicy::Keep => {
                info!(
                    target: "mesh_tetra::io",
                    path = %self.path.display(),
                    "Keeping temporary files"
                );
                None
            }
            CleanupPolicy::Delete => match self.destroy() {
                Ok(()) => None,
                Err(e) => {
                    let message = format!(
                        "Failed to remove temporary directory {}: {}",
                        self.path.display(),
                        e
                    );
                    warn!(target: "mesh_tetra::io", "{}", message);
                    Some(message)
                }
            },
        }
    }
}
