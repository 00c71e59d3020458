//! Error types for the voice repackaging pipeline

use thiserror::Error;

/// Result type alias using the pipeline Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the voice repackaging pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Index errors
    #[error("Checkpoint index not found: {path}")]
    IndexNotFound { path: String },

    #[error("Invalid voice key: {key} ({reason})")]
    InvalidVoiceKey { key: String, reason: String },

    #[error("Invalid checkpoint pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    // Hub errors
    #[error("Hub error: {message}")]
    Hub { message: String },

    #[error("Hub path not found: {path}")]
    HubPathNotFound { path: String },

    // Export errors
    #[error("Export failed for {target}: {message}")]
    ExportFailed { target: String, message: String },

    #[error("Malformed voice config {path}: {reason}")]
    MalformedConfig { path: String, reason: String },

    // Archive errors
    #[error("Archive error: {message}")]
    Archive { message: String },

    // Publish errors
    #[error("Publish failed: {message}")]
    Publish { message: String },

    // Toolkit errors
    #[error("Toolkit setup failed: {message}")]
    Toolkit { message: String },

    // Batch errors
    #[error("Batch failed: {failed} voice(s) failed, first: {first}")]
    BatchFailed { failed: usize, first: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Timeout errors
    #[error("Operation timeout: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Hub { .. } | Error::Publish { .. } | Error::Timeout { .. }
        )
    }

    /// Returns true if this error indicates a fatal condition for the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::IndexNotFound { .. }
                | Error::InvalidPattern { .. }
                | Error::InvalidConfig { .. }
                | Error::Toolkit { .. }
                | Error::Internal { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
