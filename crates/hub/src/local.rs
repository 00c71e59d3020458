//! Local mirror repository
//!
//! Serves a repository laid out on the local filesystem, e.g. a `git lfs`
//! clone of the checkpoint dataset. Fetches copy into the cache atomically
//! so a concurrent reader never sees a partial file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pack_core::{Error, Result};
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{CacheHandle, RemoteRepo};

/// Repository backed by a local directory
///
/// Provides:
/// - Recursive listing with POSIX-style relative paths
/// - Cached fetches (copy into the cache, then rename)
#[derive(Debug, Clone)]
pub struct LocalRepo {
    /// Repository root
    base_path: PathBuf,

    /// Identifier used in logs and cache layout
    id: String,
}

impl LocalRepo {
    /// Create a new LocalRepo instance
    ///
    /// # Arguments
    /// * `base_path` - Directory holding the repository files
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base_path = base_path.as_ref().to_path_buf();
        let id = base_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "local".to_string());
        Self { base_path, id }
    }

    /// Resolve a repository path to a path under the base directory
    fn resolve_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Location of a repository file inside a cache
    fn cached_path(&self, cache: &CacheHandle, path: &str) -> PathBuf {
        cache.path().join("local").join(&self.id).join(path)
    }

    /// Generate a unique temporary file path next to `target`
    fn temp_path(target: &Path) -> PathBuf {
        let temp_name = format!(
            ".{}.{}.tmp",
            target.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4()
        );
        target.with_file_name(temp_name)
    }
}

#[async_trait]
impl RemoteRepo for LocalRepo {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(repo = "local"))]
    async fn list_files(&self) -> Result<Vec<String>> {
        if !self.base_path.is_dir() {
            return Err(Error::HubPathNotFound {
                path: self.base_path.display().to_string(),
            });
        }

        let mut results = Vec::new();
        let mut stack = vec![self.base_path.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| Error::Hub {
                message: format!("Failed to list {}: {}", dir.display(), e),
            })?;

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let metadata = entry.metadata().await?;

                if metadata.is_dir() {
                    stack.push(entry_path);
                } else if metadata.is_file() {
                    if let Ok(relative) = entry_path.strip_prefix(&self.base_path) {
                        let segments: Vec<String> = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy().to_string())
                            .collect();
                        results.push(segments.join("/"));
                    }
                }
            }
        }

        results.sort();
        debug!(count = results.len(), "Listed repository files");
        Ok(results)
    }

    #[instrument(skip(self, cache), fields(repo = "local"))]
    async fn fetch(&self, path: &str, cache: &CacheHandle) -> Result<PathBuf> {
        let source = self.resolve_path(path);
        let source_meta = match fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                return Err(Error::HubPathNotFound {
                    path: path.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::HubPathNotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => {
                return Err(Error::Hub {
                    message: format!("Failed to stat {}: {}", path, e),
                })
            }
        };

        let target = self.cached_path(cache, path);
        if let Ok(cached) = fs::metadata(&target).await {
            if cached.len() == source_meta.len() {
                debug!(?target, "Cache hit");
                return Ok(target);
            }
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Error::Hub {
                message: format!("Failed to create cache directory {:?}: {}", parent, e),
            })?;
        }

        let temp_path = Self::temp_path(&target);
        fs::copy(&source, &temp_path).await.map_err(|e| Error::Hub {
            message: format!("Failed to copy {}: {}", path, e),
        })?;
        fs::rename(&temp_path, &target).await.map_err(|e| Error::Hub {
            message: format!("Failed to rename {:?} to {:?}: {}", temp_path, target, e),
        })?;

        debug!(?target, size = source_meta.len(), "Fetched file into cache");
        Ok(target)
    }
}
