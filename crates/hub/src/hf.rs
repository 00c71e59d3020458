//! Hugging Face hub repository
//!
//! Lists repository siblings through the hub API and downloads single
//! files into the hub cache layout under the given cache handle.

use std::path::PathBuf;

use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiError};
use hf_hub::{Repo, RepoType};
use pack_core::{Error, Result, SourceConfig};
use tracing::{debug, info, instrument};

use crate::{CacheHandle, RemoteRepo};

/// Repository hosted on the Hugging Face hub
#[derive(Debug, Clone)]
pub struct HfHubRepo {
    repo_id: String,
    repo_type: RepoType,
    token: Option<String>,
}

impl HfHubRepo {
    /// Create a handle for `repo_id` of the given type
    ///
    /// # Arguments
    /// * `repo_id` - e.g. `rhasspy/piper-checkpoints`
    /// * `repo_type` - `dataset`, `model` or `space`
    pub fn new(repo_id: impl Into<String>, repo_type: &str) -> Result<Self> {
        Ok(Self {
            repo_id: repo_id.into(),
            repo_type: parse_repo_type(repo_type)?,
            token: None,
        })
    }

    /// Create a handle from the pipeline source settings
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let mut repo = Self::new(config.repo_id.clone(), &config.repo_type)?;
        repo.token = config.token.clone();
        Ok(repo)
    }

    fn repo(&self) -> Repo {
        Repo::new(self.repo_id.clone(), self.repo_type)
    }

    /// Token to send instead of the saved hub login, if any
    fn token_override(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.trim().is_empty())
    }

    fn api(&self, cache: Option<&CacheHandle>) -> Result<Api> {
        // from_env honours HF_HOME and the token saved by `huggingface-cli login`
        let mut builder = ApiBuilder::from_env().with_progress(false);
        if let Some(token) = self.token_override() {
            builder = builder.with_token(Some(token));
        }
        if let Some(cache) = cache {
            builder = builder.with_cache_dir(cache.path().to_path_buf());
        }
        builder.build().map_err(|e| hub_error("create hub client", e))
    }
}

#[async_trait]
impl RemoteRepo for HfHubRepo {
    fn id(&self) -> &str {
        &self.repo_id
    }

    #[instrument(skip(self), fields(repo = %self.repo_id))]
    async fn list_files(&self) -> Result<Vec<String>> {
        let api = self.api(None)?;
        let info = api
            .repo(self.repo())
            .info()
            .await
            .map_err(|e| hub_error("list repository", e))?;

        let mut files: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
        files.sort();
        info!(count = files.len(), revision = %info.sha, "Listed hub repository");
        Ok(files)
    }

    #[instrument(skip(self, cache), fields(repo = %self.repo_id))]
    async fn fetch(&self, path: &str, cache: &CacheHandle) -> Result<PathBuf> {
        let api = self.api(Some(cache))?;
        let local = api
            .repo(self.repo())
            .get(path)
            .await
            .map_err(|e| hub_error(&format!("download {}", path), e))?;
        debug!(local = %local.display(), "Fetched hub file");
        Ok(local)
    }
}

fn parse_repo_type(repo_type: &str) -> Result<RepoType> {
    match repo_type {
        "dataset" => Ok(RepoType::Dataset),
        "model" => Ok(RepoType::Model),
        "space" => Ok(RepoType::Space),
        other => Err(Error::InvalidConfig {
            message: format!("unknown hub repository type '{}'", other),
        }),
    }
}

fn hub_error(action: &str, e: ApiError) -> Error {
    Error::Hub {
        message: format!("Failed to {}: {}", action, e),
    }
}
