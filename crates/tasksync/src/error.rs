//! Error types for tasksync operations.

use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::ErrorCategory;

/// The error type for tasksync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a local state file failed.
    #[error("State file error: {0}")]
    State(#[from] tasksync_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tracker answered with an error response.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The tracker could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The task graph as a whole is unusable.
    #[error("Invalid task graph: {0}")]
    InvalidGraph(String),

    /// One task of a generated or recovered graph is malformed.
    #[error("Invalid task at index {index}: field '{field}' {reason}")]
    InvalidTask {
        /// Position of the task in the `tasks` array
        index: usize,
        /// Offending field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// A snapshot could not be accepted for replay.
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Downloaded bytes do not hash to the expected value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum the caller asked for
        expected: String,
        /// Checksum of the bytes received
        actual: String,
    },

    /// The artifact signature does not verify.
    #[error("Artifact signature does not match")]
    SignatureMismatch,

    /// The external graph generator failed or could not be started.
    #[error("Generator error: {0}")]
    Generator(String),
}

impl Error {
    /// Resilience category of this error.
    ///
    /// Shorthand for [`crate::resilience::classify`].
    pub fn category(&self) -> ErrorCategory {
        crate::resilience::classify(self)
    }
}

/// An error response from the remote tracker.
///
/// Carries everything the resilience layer needs to classify the failure
/// and compute a delay without re-inspecting the HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerError {
    /// HTTP status code, if the request got that far
    pub status: Option<u16>,

    /// Machine-readable error code (transport or API specific)
    pub code: Option<String>,

    /// Human-readable message from the tracker
    pub message: String,

    /// Value of a `Retry-After` header
    pub retry_after: Option<Duration>,

    /// When the current rate-limit window resets
    pub rate_limit_reset: Option<DateTime<Utc>>,
}

impl TrackerError {
    /// Create an error for an HTTP status with a message.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Builder-style helper attaching a `Retry-After` delay.
    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Builder-style helper attaching a rate-limit reset time.
    #[must_use]
    pub fn with_reset(mut self, reset: DateTime<Utc>) -> Self {
        self.rate_limit_reset = Some(reset);
        self
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "Tracker returned {status}: {}", self.message),
            None => write!(f, "Tracker request failed: {}", self.message),
        }
    }
}

impl std::error::Error for TrackerError {}

/// A specialized Result type for tasksync operations.
pub type Result<T> = std::result::Result<T, Error>;
