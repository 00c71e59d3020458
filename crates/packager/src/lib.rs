//! Voice packaging for the repackaging pipeline
//!
//! Provides the exporter capability, archive writing with completion
//! markers, and the per-voice export-and-package workflow.

pub mod archive;
pub mod exporter;
pub mod packager;

pub use archive::{ArchiveSummary, CompletionMarker};
pub use exporter::{CommandExporter, Exporter};
pub use packager::{PackageOutcome, VoicePackager};
