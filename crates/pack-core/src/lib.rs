//! Pack Core - Foundation for the voice repackaging pipeline
//!
//! Provides the shared data model, configuration and error handling
//! used by the indexer, the packager and the batch driver.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ArchiveFormat, BatchConfig, CacheStrategy, Concurrency, ExportConfig, IndexConfig,
    KeyFormat, PackagingConfig, PipelineConfig, PublishConfig, SourceConfig, ToolkitConfig,
};
pub use error::{Error, Result};
pub use types::*;
