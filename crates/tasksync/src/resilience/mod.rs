//! Error categorization and retry handling for remote calls.
//!
//! Every call to the tracker (and every artifact download) runs through
//! [`with_retry`]. The executor classifies each failure into an
//! [`ErrorCategory`], which decides whether the failure is retried, how many
//! times, and how long to wait in between.

mod retry;

pub use retry::{retry_delay, with_retry, MAX_DELAY};

use crate::error::Error;
use serde::Serialize;
use std::fmt;
use std::io;
use std::time::Duration;

/// Broad class of a failure, as seen by the retry executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The tracker asked us to slow down
    RateLimit,
    /// Transport failure or server-side error
    Network,
    /// The request itself is wrong; retrying cannot help
    Validation,
    /// Credentials are missing, wrong or lack permission
    Authentication,
    /// A recovered artifact failed verification
    InvalidArtifact,
    /// Anything else
    Unknown,
}

impl ErrorCategory {
    /// Whether failures of this category are worth retrying.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Unknown)
    }

    /// Upper bound on retries for this category.
    pub const fn max_retries(self) -> u32 {
        match self {
            Self::RateLimit => 10,
            Self::Network => 5,
            Self::Unknown => 3,
            Self::Validation | Self::Authentication | Self::InvalidArtifact => 0,
        }
    }

    /// First-retry delay, doubled on each further attempt.
    pub const fn base_delay(self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(60),
            Self::Network => Duration::from_secs(1),
            Self::Unknown => Duration::from_secs(2),
            Self::Validation | Self::Authentication | Self::InvalidArtifact => Duration::ZERO,
        }
    }

    /// Stable snake_case name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::InvalidArtifact => "invalid_artifact",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TRANSPORT_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "EAI_AGAIN",
    "EPIPE",
];

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("rate-limit") || lower.contains("abuse")
}

fn mentions_transport_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("dns error")
}

/// Classify a failure from its raw parts.
///
/// `status` is the HTTP status (absent for transport failures), `code` a
/// transport or API error code, and `message` the human-readable text.
pub fn classify_parts(status: Option<u16>, code: Option<&str>, message: &str) -> ErrorCategory {
    match status {
        Some(429) => ErrorCategory::RateLimit,
        Some(403) if mentions_rate_limit(message) => ErrorCategory::RateLimit,
        Some(401 | 403) => ErrorCategory::Authentication,
        Some(400 | 422) => ErrorCategory::Validation,
        Some(500..=599) => ErrorCategory::Network,
        Some(_) => ErrorCategory::Unknown,
        None => {
            if code.is_some_and(|c| TRANSPORT_CODES.contains(&c)) {
                ErrorCategory::Network
            } else if mentions_rate_limit(message) {
                ErrorCategory::RateLimit
            } else if mentions_transport_failure(message) {
                ErrorCategory::Network
            } else {
                ErrorCategory::Unknown
            }
        }
    }
}

/// Classify a tasksync error.
pub fn classify(error: &Error) -> ErrorCategory {
    match error {
        Error::Tracker(e) => classify_parts(e.status, e.code.as_deref(), &e.message),
        Error::Network(_) => ErrorCategory::Network,
        Error::Io(e) => match e.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::Interrupted => ErrorCategory::Network,
            _ => ErrorCategory::Unknown,
        },
        Error::Json(_)
        | Error::Config(_)
        | Error::InvalidGraph(_)
        | Error::InvalidTask { .. } => ErrorCategory::Validation,
        Error::InvalidArtifact(_) | Error::ChecksumMismatch { .. } | Error::SignatureMismatch => {
            ErrorCategory::InvalidArtifact
        }
        Error::State(_) | Error::Generator(_) => ErrorCategory::Unknown,
    }
}
