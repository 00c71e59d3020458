//! Remote repository trait definition
//!
//! Defines the async interface the indexer and the packager use to read a
//! checkpoint repository.

use std::path::PathBuf;

use async_trait::async_trait;
use pack_core::Result;

use crate::CacheHandle;

/// Async trait for checkpoint repositories
///
/// Implementors list the files of one repository and materialize single
/// files locally, either from the Hugging Face hub or from a local mirror.
#[async_trait]
pub trait RemoteRepo: Send + Sync {
    /// Repository identifier, used in logs
    fn id(&self) -> &str;

    /// List every file in the repository
    ///
    /// # Returns
    /// POSIX-style paths relative to the repository root
    ///
    /// # Errors
    /// Returns error if the listing request fails
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Materialize a file locally
    ///
    /// Files already present in `cache` are reused.
    ///
    /// # Arguments
    /// * `path` - Path relative to the repository root
    /// * `cache` - Cache the file is downloaded into
    ///
    /// # Returns
    /// Local path of the file inside the cache
    ///
    /// # Errors
    /// Returns error if the path doesn't exist or the transfer fails
    async fn fetch(&self, path: &str, cache: &CacheHandle) -> Result<PathBuf>;
}
