//! Checkpoint indexer
//!
//! Voice keys are derived from the directory convention of the checkpoint
//! dataset, `<root>/<language>/<name>/<quality>/<file>.ckpt`: the parent
//! directory minus its first segment, joined with `-`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use hub::RemoteRepo;
use pack_core::{
    CheckpointIndex, CheckpointRecord, Error, IndexConfig, Result, CONFIG_FILE_NAME,
    MODEL_CARD_FILE_NAME,
};
use regex::Regex;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Outcome of [`CheckpointIndexer::write_index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// An index file already existed and was left untouched
    Skipped,

    /// A fresh index was written
    Written { voices: usize },
}

/// Voice key for a checkpoint path, or `None` if the path is too shallow
pub fn derive_voice_key(checkpoint: &str) -> Option<String> {
    let (parent, _) = checkpoint.rsplit_once('/')?;
    let key = parent
        .split('/')
        .skip(1)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn sibling(path: &str, file_name: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) => format!("{}/{}", parent, file_name),
        None => file_name.to_string(),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Build the checkpoint index from a repository listing
///
/// Only paths whose file name matches `pattern` are indexed. When several
/// checkpoints share a directory, the greatest path wins.
pub fn build_index<S: AsRef<str>>(listing: &[S], pattern: &Regex) -> CheckpointIndex {
    let all_files: HashSet<&str> = listing.iter().map(|p| p.as_ref()).collect();

    let mut checkpoints: Vec<&str> = all_files
        .iter()
        .copied()
        .filter(|p| pattern.is_match(file_name(p)))
        .collect();
    checkpoints.sort_unstable();

    let mut index = CheckpointIndex::new();
    for path in checkpoints {
        let Some(key) = derive_voice_key(path) else {
            warn!(checkpoint = %path, "Checkpoint outside the language/name/quality layout, skipping");
            continue;
        };

        let model_card = sibling(path, MODEL_CARD_FILE_NAME);
        let record = CheckpointRecord {
            checkpoint: path.to_string(),
            config: sibling(path, CONFIG_FILE_NAME),
            model_card: all_files.contains(model_card.as_str()).then_some(model_card),
        };

        if let Some(previous) = index.insert(key.clone(), record) {
            warn!(
                voice_key = %key,
                replaced = %previous.checkpoint,
                checkpoint = %path,
                "Several checkpoints for one voice, keeping the last"
            );
        }
    }

    debug!(voices = index.len(), files = all_files.len(), "Built checkpoint index");
    index
}

/// Read a persisted checkpoint index
pub async fn load_index(path: &Path) -> Result<CheckpointIndex> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::IndexNotFound {
                path: path.display().to_string(),
            })
        }
        Err(e) => return Err(Error::Io(e)),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Indexer bound to one index file and checkpoint pattern
#[derive(Debug, Clone)]
pub struct CheckpointIndexer {
    index_path: PathBuf,
    pattern: Regex,
}

impl CheckpointIndexer {
    /// Create an indexer from the pipeline index settings
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let pattern = Regex::new(&config.checkpoint_pattern).map_err(|e| Error::InvalidPattern {
            pattern: config.checkpoint_pattern.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            index_path: config.path.clone(),
            pattern,
        })
    }

    /// Index file location
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Build an index from a listing with this indexer's pattern
    pub fn build<S: AsRef<str>>(&self, listing: &[S]) -> CheckpointIndex {
        build_index(listing, &self.pattern)
    }

    /// List `repo`, build the index and persist it
    ///
    /// An existing index file is reused as-is unless `refresh` is set; the
    /// remote is not contacted in that case.
    #[instrument(skip(self, repo), fields(repo = %repo.id(), index = %self.index_path.display()))]
    pub async fn write_index(&self, repo: &dyn RemoteRepo, refresh: bool) -> Result<IndexOutcome> {
        if !refresh && fs::metadata(&self.index_path).await.is_ok() {
            info!("Checkpoint index already present, doing nothing");
            return Ok(IndexOutcome::Skipped);
        }

        let listing = repo.list_files().await?;
        let index = self.build(&listing);
        let json = serde_json::to_string_pretty(&index)?;

        if let Some(parent) = self.index_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let temp_name = format!(
            ".{}.{}.tmp",
            self.index_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy(),
            Uuid::new_v4()
        );
        let temp_path = self.index_path.with_file_name(temp_name);
        fs::write(&temp_path, json.as_bytes()).await?;
        fs::rename(&temp_path, &self.index_path).await?;

        info!(voices = index.len(), "Wrote checkpoint index");
        Ok(IndexOutcome::Written {
            voices: index.len(),
        })
    }

    /// Read the index file
    pub async fn load(&self) -> Result<CheckpointIndex> {
        load_index(&self.index_path).await
    }
}
