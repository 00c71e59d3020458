//! Checkpoint discovery for the voice repackaging pipeline
//!
//! Scans a repository listing for checkpoint files, keys each one by voice
//! and persists the resulting index.

pub mod index;

pub use index::{build_index, derive_voice_key, load_index, CheckpointIndexer, IndexOutcome};
