//! Download cache handles

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pack_core::{Error, Result};
use tempfile::TempDir;
use tracing::debug;

/// Handle to the directory downloads are cached in
///
/// A shared handle points at a long-lived directory. A scoped handle owns
/// a temporary directory that is deleted when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    root: PathBuf,
    scope: Option<Arc<TempDir>>,
}

impl CacheHandle {
    /// Shared cache rooted at `path`
    pub fn shared<P: AsRef<Path>>(path: P) -> Self {
        Self {
            root: path.as_ref().to_path_buf(),
            scope: None,
        }
    }

    /// Fresh temporary cache in the system temp directory
    pub fn scoped() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("voicepack-")
            .tempdir()
            .map_err(|e| Error::Internal {
                message: format!("Failed to create scoped cache: {}", e),
            })?;
        Ok(Self::from_temp_dir(dir))
    }

    /// Fresh temporary cache inside `parent`
    pub fn scoped_in<P: AsRef<Path>>(parent: P) -> Result<Self> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix("voicepack-")
            .tempdir_in(parent)
            .map_err(|e| Error::Internal {
                message: format!("Failed to create scoped cache in {}: {}", parent.display(), e),
            })?;
        Ok(Self::from_temp_dir(dir))
    }

    fn from_temp_dir(dir: TempDir) -> Self {
        Self {
            root: dir.path().to_path_buf(),
            scope: Some(Arc::new(dir)),
        }
    }

    /// Cache root directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// True if the cache is deleted on drop
    pub fn is_scoped(&self) -> bool {
        self.scope.is_some()
    }

    /// Best-effort removal of a shared cache directory
    ///
    /// Failures are logged and swallowed. Scoped caches clean themselves up.
    pub async fn purge(&self) {
        if self.is_scoped() {
            return;
        }
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!(path = %self.root.display(), "Purged shared cache"),
            Err(e) => debug!(path = %self.root.display(), error = %e, "Ignoring cache purge failure"),
        }
    }
}
