//! Pipeline configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source repository holding the checkpoints
    pub source: SourceConfig,

    /// Checkpoint index settings
    pub index: IndexConfig,

    /// Training toolkit checkout
    pub toolkit: ToolkitConfig,

    /// Exporter invocation
    pub export: ExportConfig,

    /// Output and archive settings
    pub packaging: PackagingConfig,

    /// Batch driver settings
    pub batch: BatchConfig,

    /// Upload settings
    pub publish: PublishConfig,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded pipeline configuration");
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.source.repo_id.is_empty() && self.source.local_mirror.is_none() {
            return Err(Error::InvalidConfig {
                message: "source.repo_id or source.local_mirror must be set".to_string(),
            });
        }
        if self.index.checkpoint_pattern.is_empty() {
            return Err(Error::InvalidConfig {
                message: "index.checkpoint_pattern must not be empty".to_string(),
            });
        }
        if self.export.program.is_empty() {
            return Err(Error::InvalidConfig {
                message: "export.program must not be empty".to_string(),
            });
        }
        if self.batch.workers == 0 {
            return Err(Error::InvalidConfig {
                message: "batch.workers must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Source repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Hub repository identifier
    pub repo_id: String,

    /// Hub repository type (`dataset`, `model`, `space`)
    pub repo_type: String,

    /// Optional hub token
    pub token: Option<String>,

    /// Read from a local directory mirroring the repository instead of the hub
    pub local_mirror: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repo_id: "rhasspy/piper-checkpoints".to_string(),
            repo_type: "dataset".to_string(),
            token: None,
            local_mirror: None,
        }
    }
}

/// Checkpoint index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index file location
    pub path: PathBuf,

    /// Regex matched against file names to select checkpoints
    pub checkpoint_pattern: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("checkpoints.json"),
            checkpoint_pattern: r"\.ckpt$".to_string(),
        }
    }
}

/// Training toolkit checkout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Git URL of the toolkit
    pub repo_url: String,

    /// Branch carrying the streaming exporter
    pub branch: String,

    /// Checkout directory
    pub dir: PathBuf,

    /// Python sources, relative to `dir`; the exporter runs from here
    pub python_dir: PathBuf,

    /// Build script run with `sh` inside `python_dir` after checkout
    pub build_script: Option<String>,
}

impl ToolkitConfig {
    /// Working directory of the exporter
    pub fn python_path(&self) -> PathBuf {
        self.dir.join(&self.python_dir)
    }
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            repo_url: "https://github.com/mush42/piper".to_string(),
            branch: "streaming".to_string(),
            dir: PathBuf::from("piper"),
            python_dir: PathBuf::from("src/python"),
            build_script: Some("build_monotonic_align.sh".to_string()),
        }
    }
}

/// Exporter invocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Program to run
    pub program: String,

    /// Arguments placed before `<checkpoint> <output_dir>`
    pub args: Vec<String>,

    /// Kill the exporter after this long
    #[serde(with = "option_millis")]
    pub timeout: Option<Duration>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec![
                "-m".to_string(),
                "piper_train.export_onnx_streaming".to_string(),
                "--debug".to_string(),
            ],
            timeout: None,
        }
    }
}

/// Output and archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Root of the per-voice exporter output directories
    pub output_dir: PathBuf,

    /// Directory receiving the archives
    pub archive_dir: PathBuf,

    /// Archive container
    pub archive_format: ArchiveFormat,

    /// Real-time marker placement in archive names and config keys
    pub key_format: KeyFormat,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            archive_dir: PathBuf::from("packed"),
            archive_format: ArchiveFormat::default(),
            key_format: KeyFormat::default(),
        }
    }
}

/// Batch driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Sequential or pooled processing
    pub concurrency: Concurrency,

    /// Pool size in pooled mode
    pub workers: usize,

    /// Download cache strategy
    pub cache: CacheStrategy,

    /// Cache directory used by the shared strategy
    pub shared_cache_dir: PathBuf,

    /// Parent of the per-voice scoped caches, the system temp dir when unset
    pub scoped_cache_root: Option<PathBuf>,

    /// Remove the shared cache once the batch is over
    pub purge_shared_cache: bool,

    /// Keep scheduling voices after a failure
    pub keep_going: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::default(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cache: CacheStrategy::default(),
            shared_cache_dir: PathBuf::from(".cache/hub"),
            scoped_cache_root: None,
            purge_shared_cache: true,
            keep_going: false,
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Destination repository
    pub repo_id: String,

    /// Destination repository type
    pub repo_type: String,

    /// Commit message of the upload
    pub commit_message: String,

    /// Hub client executable
    pub program: String,

    /// Optional hub token
    pub token: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            repo_id: String::new(),
            repo_type: "dataset".to_string(),
            commit_message: "Upload streaming voices".to_string(),
            program: "huggingface-cli".to_string(),
            token: None,
        }
    }
}

/// How voices are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Concurrency {
    /// One voice at a time, in index order
    #[default]
    Sequential,

    /// Bounded worker pool
    Pooled,
}

/// Archive container for packaged voices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// `.zip` (deflate)
    #[default]
    Zip,

    /// `.tar.gz`
    TarGz,
}

impl ArchiveFormat {
    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    /// Archive file name for a streaming key
    pub fn file_name(&self, streaming_key: &str) -> String {
        format!("{}.{}", streaming_key, self.extension())
    }
}

/// Where downloads are cached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// One cache directory for the whole batch
    Shared,

    /// A fresh temporary directory per voice
    #[default]
    ScopedTemp,
}

/// Placement of the real-time marker in a voice key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyFormat {
    /// `lang-name-rt-quality`
    RtSegment,

    /// `lang-name+RT-quality`
    #[default]
    RtSuffix,
}

macro_rules! impl_from_str {
    ($ty:ty, $what:literal, { $($name:literal => $value:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($value),)+
                    other => Err(Error::InvalidConfig {
                        message: format!(
                            concat!("unknown ", $what, " '{}', expected one of: {}"),
                            other,
                            [$($name),+].join(", ")
                        ),
                    }),
                }
            }
        }
    };
}

impl_from_str!(Concurrency, "concurrency", {
    "sequential" => Concurrency::Sequential,
    "pooled" => Concurrency::Pooled,
});

impl_from_str!(ArchiveFormat, "archive format", {
    "zip" => ArchiveFormat::Zip,
    "tar-gz" => ArchiveFormat::TarGz,
});

impl_from_str!(CacheStrategy, "cache strategy", {
    "shared" => CacheStrategy::Shared,
    "scoped-temp" => CacheStrategy::ScopedTemp,
});

impl_from_str!(KeyFormat, "key format", {
    "rt-segment" => KeyFormat::RtSegment,
    "rt-suffix" => KeyFormat::RtSuffix,
});

/// Optional duration serialized as milliseconds
mod option_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.source.repo_id, "rhasspy/piper-checkpoints");
        assert_eq!(config.packaging.archive_format, ArchiveFormat::Zip);
        assert!(config.batch.workers >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_serialization() {
        let mut config = PipelineConfig::default();
        config.export.timeout = Some(Duration::from_secs(90));
        config.batch.concurrency = Concurrency::Pooled;

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"pooled\""));

        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.export.timeout, Some(Duration::from_secs(90)));
        assert_eq!(parsed.batch.concurrency, Concurrency::Pooled);
    }

    #[test]
    fn test_partial_config_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voicepack.json");
        std::fs::write(
            &path,
            r#"{"packaging": {"archive_format": "tar-gz"}, "batch": {"keep_going": true}}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.packaging.archive_format, ArchiveFormat::TarGz);
        assert_eq!(config.packaging.key_format, KeyFormat::RtSuffix);
        assert!(config.batch.keep_going);
        assert_eq!(config.index.path, PathBuf::from("checkpoints.json"));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = PipelineConfig::default();
        config.batch.workers = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_enum_from_str() {
        assert_eq!("pooled".parse::<Concurrency>().unwrap(), Concurrency::Pooled);
        assert_eq!("tar-gz".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarGz);
        assert_eq!("shared".parse::<CacheStrategy>().unwrap(), CacheStrategy::Shared);
        assert_eq!("rt-segment".parse::<KeyFormat>().unwrap(), KeyFormat::RtSegment);
        assert!("bogus".parse::<KeyFormat>().is_err());
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(ArchiveFormat::Zip.file_name("en-amy+RT-medium"), "en-amy+RT-medium.zip");
        assert_eq!(ArchiveFormat::TarGz.file_name("en-amy-rt-medium"), "en-amy-rt-medium.tar.gz");
    }
}
