//! Error types for tasksync-json operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for tasksync-json operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred while reading or writing.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization of an in-memory value failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file on disk exists but does not hold the expected JSON document.
    #[error("Invalid JSON in {path}: {reason}")]
    InvalidFormat {
        /// The file that failed to parse.
        path: PathBuf,
        /// Parser message, including line and column.
        reason: String,
    },
}

/// A specialized Result type for tasksync-json operations.
pub type Result<T> = std::result::Result<T, Error>;
