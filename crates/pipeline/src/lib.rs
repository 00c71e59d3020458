//! Batch pipeline for streaming voice repackaging
//!
//! This crate wires the pieces together:
//! - **Toolkit setup**: clone and build the training toolkit that owns the exporter
//! - **Indexing**: list the checkpoint repository and persist the voice index
//! - **Batch driving**: package every indexed voice, sequentially or on a bounded pool
//! - **Publishing**: upload the packed archives
//!
//! # Example
//!
//! ```ignore
//! use pipeline::{app, RunOptions};
//! use pack_core::PipelineConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let report = app::run(&PipelineConfig::default(), &RunOptions::default()).await?;
//!     println!("{} packaged", report.packaged.len());
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod driver;
pub mod toolkit;

pub use app::RunOptions;
pub use driver::{BatchDriver, BatchReport};
pub use toolkit::{ensure_toolkit, ToolkitOutcome};
