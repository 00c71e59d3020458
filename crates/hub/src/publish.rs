//! Publishing packed archives
//!
//! Uploads go through the external hub client; the local publisher copies
//! archives into a directory (a mounted share or a staging area).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pack_core::{Error, PublishConfig, Result};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Result of a publish call
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    /// Where the files went
    pub destination: String,

    /// Archive file names that were published
    pub files: Vec<String>,
}

/// Async trait for archive publishers
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish every archive in `local_dir` whose name ends with `.{extension}`
    ///
    /// Nothing is published when no archive matches.
    async fn publish(&self, local_dir: &Path, extension: &str) -> Result<PublishReport>;
}

/// List archive file names in `local_dir`, sorted
pub async fn collect_archives(local_dir: &Path, extension: &str) -> Result<Vec<String>> {
    let suffix = format!(".{}", extension);
    let mut entries = fs::read_dir(local_dir).await.map_err(|e| Error::Publish {
        message: format!("Failed to read {}: {}", local_dir.display(), e),
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(&suffix) && !name.starts_with('.') {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// Publisher driving the `huggingface-cli upload` command
#[derive(Debug, Clone)]
pub struct HubCliPublisher {
    program: String,
    repo_id: String,
    repo_type: String,
    commit_message: String,
    token: Option<String>,
}

impl HubCliPublisher {
    /// Create a publisher from the pipeline publish settings
    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        if config.repo_id.is_empty() {
            return Err(Error::InvalidConfig {
                message: "publish.repo_id must be set".to_string(),
            });
        }
        Ok(Self {
            program: config.program.clone(),
            repo_id: config.repo_id.clone(),
            repo_type: config.repo_type.clone(),
            commit_message: config.commit_message.clone(),
            token: config.token.clone(),
        })
    }

    fn command_args(&self, local_dir: &Path, extension: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "upload".into(),
            self.repo_id.clone().into(),
            local_dir.as_os_str().to_os_string(),
            ".".into(),
            "--repo-type".into(),
            self.repo_type.clone().into(),
            "--include".into(),
            format!("*.{}", extension).into(),
            "--commit-message".into(),
            self.commit_message.clone().into(),
        ];
        if let Some(token) = &self.token {
            args.push("--token".into());
            args.push(token.clone().into());
        }
        args
    }
}

#[async_trait]
impl Publisher for HubCliPublisher {
    #[instrument(skip(self), fields(repo = %self.repo_id))]
    async fn publish(&self, local_dir: &Path, extension: &str) -> Result<PublishReport> {
        let files = collect_archives(local_dir, extension).await?;
        let destination = format!("{}:{}", self.repo_type, self.repo_id);
        if files.is_empty() {
            info!("No archives to publish");
            return Ok(PublishReport { destination, files });
        }

        info!(count = files.len(), "Uploading archives");
        let output = Command::new(&self.program)
            .args(self.command_args(local_dir, extension))
            .output()
            .await
            .map_err(|e| Error::Publish {
                message: format!("Failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(Error::Publish {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        info!(count = files.len(), "Upload complete");
        Ok(PublishReport { destination, files })
    }
}

/// Publisher copying archives into a local directory
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    target_dir: PathBuf,
}

impl LocalPublisher {
    pub fn new<P: AsRef<Path>>(target_dir: P) -> Self {
        Self {
            target_dir: target_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    #[instrument(skip(self), fields(target = %self.target_dir.display()))]
    async fn publish(&self, local_dir: &Path, extension: &str) -> Result<PublishReport> {
        let files = collect_archives(local_dir, extension).await?;
        fs::create_dir_all(&self.target_dir).await?;

        for name in &files {
            let target = self.target_dir.join(name);
            let temp = self
                .target_dir
                .join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
            fs::copy(local_dir.join(name), &temp).await?;
            fs::rename(&temp, &target).await?;
            debug!(file = %name, "Published archive");
        }

        Ok(PublishReport {
            destination: self.target_dir.display().to_string(),
            files,
        })
    }
}
