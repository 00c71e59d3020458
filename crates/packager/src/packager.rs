//! Per-voice export-and-package workflow

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hub::{CacheHandle, RemoteRepo};
use pack_core::{
    ArchiveFormat, CheckpointRecord, Error, KeyFormat, PackagingConfig, Result, VoiceExport,
    VoiceKey, CONFIG_FILE_NAME, MODEL_CARD_FILE_NAME,
};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::archive::{self, ArchiveSummary};
use crate::Exporter;

/// Result of packaging one voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// A new archive was written
    Packaged { archive: PathBuf, entries: Vec<String> },

    /// A complete archive already existed
    Skipped { archive: PathBuf },
}

impl PackageOutcome {
    pub fn archive(&self) -> &Path {
        match self {
            PackageOutcome::Packaged { archive, .. } | PackageOutcome::Skipped { archive } => {
                archive
            }
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PackageOutcome::Skipped { .. })
    }
}

/// Packages voices from a repository with an exporter
///
/// Cheap to clone; clones share the repository and exporter.
#[derive(Clone)]
pub struct VoicePackager {
    repo: Arc<dyn RemoteRepo>,
    exporter: Arc<dyn Exporter>,
    output_root: PathBuf,
    archive_dir: PathBuf,
    archive_format: ArchiveFormat,
    key_format: KeyFormat,
}

impl VoicePackager {
    pub fn new(
        repo: Arc<dyn RemoteRepo>,
        exporter: Arc<dyn Exporter>,
        config: &PackagingConfig,
    ) -> Self {
        Self {
            repo,
            exporter,
            output_root: config.output_dir.clone(),
            archive_dir: config.archive_dir.clone(),
            archive_format: config.archive_format,
            key_format: config.key_format,
        }
    }

    /// Archive location for a streaming key
    pub fn archive_path(&self, streaming_key: &str) -> PathBuf {
        self.archive_dir
            .join(self.archive_format.file_name(streaming_key))
    }

    /// Export and package one voice
    ///
    /// Returns `Skipped` without fetching or exporting anything when a
    /// complete archive exists. An archive without a valid completion
    /// marker is removed and rebuilt.
    #[instrument(skip(self, record, cache), fields(voice_key = %voice_key))]
    pub async fn package(
        &self,
        voice_key: &str,
        record: &CheckpointRecord,
        cache: &CacheHandle,
    ) -> Result<PackageOutcome> {
        let streaming_key = VoiceKey::parse(voice_key)?.streaming_key(self.key_format);
        let archive_path = self.archive_path(&streaming_key);

        let probe = archive_path.clone();
        let complete = tokio::task::spawn_blocking(move || {
            if archive::is_complete(&probe)? {
                return Ok(true);
            }
            if probe.exists() {
                warn!(archive = %probe.display(), "Archive without completion marker, rebuilding");
                archive::discard(&probe)?;
            }
            Ok::<_, Error>(false)
        })
        .await
        .map_err(join_error)??;
        if complete {
            info!(streaming_key = %streaming_key, "Voice already converted");
            return Ok(PackageOutcome::Skipped {
                archive: archive_path,
            });
        }

        info!(streaming_key = %streaming_key, "Making voice");
        let output_dir = self.output_root.join(voice_key);
        reset_dir(&output_dir).await?;

        let local_checkpoint = self.repo.fetch(&record.checkpoint, cache).await?;
        let mut export = VoiceExport {
            voice_key: voice_key.to_string(),
            streaming_key,
            local_checkpoint,
            local_config: None,
            local_model_card: None,
            output_dir,
        };

        self.exporter
            .export(&export.local_checkpoint, &export.output_dir)
            .await?;

        let local_config = export
            .local_config
            .insert(self.repo.fetch(&record.config, cache).await?);
        patch_config(local_config, &export.streaming_key, &export.output_dir).await?;

        if let Some(model_card) = &record.model_card {
            export.local_model_card = Some(self.repo.fetch(model_card, cache).await?);
        }
        if let Some(local_card) = &export.local_model_card {
            fs::copy(local_card, export.output_dir.join(MODEL_CARD_FILE_NAME)).await?;
        }

        let summary = self.write_archive(&export, archive_path).await?;
        info!(
            streaming_key = %export.streaming_key,
            entries = summary.entries.len(),
            size_bytes = summary.size_bytes,
            "Exported voice"
        );

        Ok(PackageOutcome::Packaged {
            archive: summary.path,
            entries: summary.entries,
        })
    }

    async fn write_archive(&self, export: &VoiceExport, target: PathBuf) -> Result<ArchiveSummary> {
        let format = self.archive_format;
        let output_dir = export.output_dir.clone();
        tokio::task::spawn_blocking(move || {
            let entries = archive::collect_entries(&output_dir)?;
            let summary = archive::write_archive(format, &entries, &target)?;
            archive::write_marker(&summary)?;
            Ok(summary)
        })
        .await
        .map_err(join_error)?
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Internal {
        message: format!("Archive task failed: {}", e),
    }
}

/// Empty the per-voice output directory, creating it if needed
async fn reset_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Cleared stale export output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(dir).await?;
    Ok(())
}

/// Write the source config into `output_dir` with `key` and `streaming` set
///
/// Replaces any `config.json` the exporter produced.
pub async fn patch_config(source: &Path, streaming_key: &str, output_dir: &Path) -> Result<()> {
    let malformed = |reason: String| Error::MalformedConfig {
        path: source.display().to_string(),
        reason,
    };

    let raw = fs::read_to_string(source).await?;
    let mut config: Value = serde_json::from_str(&raw).map_err(|e| malformed(e.to_string()))?;
    let object = config
        .as_object_mut()
        .ok_or_else(|| malformed("not a JSON object".to_string()))?;
    object.insert("key".to_string(), Value::String(streaming_key.to_string()));
    object.insert("streaming".to_string(), Value::Bool(true));

    let patched = serde_json::to_string_pretty(&config)?;
    fs::write(output_dir.join(CONFIG_FILE_NAME), patched).await?;
    Ok(())
}
