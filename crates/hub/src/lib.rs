//! Hub - Remote repositories for the voice repackaging pipeline
//!
//! Provides the collaborators the pipeline talks to:
//! - Listing and fetching repository files, from a local mirror (default
//!   feature) or the Hugging Face hub (with the `hf` feature)
//! - Explicit download cache handles, shared or scoped to one voice
//! - Publishing packed archives
//!
//! # Example
//!
//! ```no_run
//! use hub::{CacheHandle, LocalRepo, RemoteRepo};
//!
//! # async fn example() -> pack_core::Result<()> {
//! let repo = LocalRepo::new("/data/piper-checkpoints");
//! let files = repo.list_files().await?;
//! let cache = CacheHandle::scoped()?;
//! let local = repo.fetch(&files[0], &cache).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod cache;
mod local;
mod publish;

#[cfg(feature = "hf")]
mod hf;

pub use backend::RemoteRepo;
pub use cache::CacheHandle;
pub use local::LocalRepo;
pub use publish::{collect_archives, HubCliPublisher, LocalPublisher, PublishReport, Publisher};

#[cfg(feature = "hf")]
pub use hf::HfHubRepo;
