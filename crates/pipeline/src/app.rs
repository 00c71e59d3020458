//! Pipeline tasks
//!
//! Each public function is one step the command line exposes. `run` chains
//! setup, indexing and the batch the way a full conversion needs them.

use std::sync::Arc;

use checkpoint::{CheckpointIndexer, IndexOutcome};
use hub::{HfHubRepo, HubCliPublisher, LocalRepo, PublishReport, Publisher, RemoteRepo};
use pack_core::{PipelineConfig, Result, SourceConfig};
use packager::{CommandExporter, Exporter, VoicePackager};
use tracing::{info, warn};

use crate::driver::{BatchDriver, BatchReport};
use crate::toolkit::ensure_toolkit;

/// Switches for [`run`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Don't clone or build the toolkit
    pub skip_setup: bool,

    /// Re-clone the toolkit even if present
    pub force_setup: bool,

    /// Rebuild the checkpoint index even if present
    pub refresh_index: bool,
}

/// Repository the checkpoints are read from
pub fn open_repo(source: &SourceConfig) -> Result<Arc<dyn RemoteRepo>> {
    match &source.local_mirror {
        Some(mirror) => {
            info!(mirror = %mirror.display(), "Reading checkpoints from local mirror");
            Ok(Arc::new(LocalRepo::new(mirror)))
        }
        None => Ok(Arc::new(HfHubRepo::from_config(source)?)),
    }
}

/// Exporter running from the toolkit's python sources when they exist
pub fn build_exporter(config: &PipelineConfig) -> Arc<dyn Exporter> {
    let python_dir = config.toolkit.python_path();
    let working_dir = if python_dir.is_dir() {
        Some(python_dir)
    } else {
        warn!(
            dir = %python_dir.display(),
            "Toolkit sources not found, running exporter from the current directory"
        );
        None
    };
    Arc::new(CommandExporter::from_config(&config.export, working_dir))
}

/// Batch driver over the configured repository and exporter
pub fn build_driver(
    config: &PipelineConfig,
    repo: Arc<dyn RemoteRepo>,
    exporter: Arc<dyn Exporter>,
) -> BatchDriver {
    let packager = VoicePackager::new(repo, exporter, &config.packaging);
    BatchDriver::new(packager, config.batch.clone())
}

/// Write the checkpoint index
pub async fn index(
    config: &PipelineConfig,
    repo: &dyn RemoteRepo,
    refresh: bool,
) -> Result<IndexOutcome> {
    let indexer = CheckpointIndexer::new(&config.index)?;
    let outcome = indexer.write_index(repo, refresh).await?;
    if let IndexOutcome::Written { voices } = outcome {
        info!(voices, path = %indexer.index_path().display(), "Wrote checkpoint info");
    }
    Ok(outcome)
}

/// Setup, index, then package every voice
pub async fn run(config: &PipelineConfig, options: &RunOptions) -> Result<BatchReport> {
    config.validate()?;

    if !options.skip_setup {
        ensure_toolkit(&config.toolkit, options.force_setup).await?;
    }

    let repo = open_repo(&config.source)?;
    index(config, repo.as_ref(), options.refresh_index).await?;

    let indexer = CheckpointIndexer::new(&config.index)?;
    let voices = indexer.load().await?;

    tokio::fs::create_dir_all(&config.packaging.output_dir).await?;
    tokio::fs::create_dir_all(&config.packaging.archive_dir).await?;

    let driver = build_driver(config, repo, build_exporter(config));
    driver.run_all(&voices).await
}

/// Upload the archive directory
pub async fn publish(config: &PipelineConfig) -> Result<PublishReport> {
    let publisher = HubCliPublisher::from_config(&config.publish)?;
    publisher
        .publish(
            &config.packaging.archive_dir,
            config.packaging.archive_format.extension(),
        )
        .await
}
