//! Recovery of task graphs from stored snapshots.
//!
//! A snapshot is fetched from a [`ArtifactSource`], checked against an
//! optional expected checksum and signature, decoded (upgrading legacy
//! shapes), validated and finally turned back into a [`TaskGraph`]. The
//! whole sequence runs under the retry executor, so a flaky download is
//! retried while an integrity or shape failure stops immediately.

mod snapshot;
mod source;
mod store;
mod verify;

pub use snapshot::{
    parse_snapshot, tasks_checksum, ArtifactSnapshot, MasterSection, ParsedSnapshot,
    RetentionPolicy, SnapshotMetadata,
};
pub use source::{ArtifactLocation, ArtifactSource, DefaultSource};
pub use store::{ArtifactStore, StoredArtifact};
pub use verify::{sha256_hex, sign, verify_checksum, verify_signature};

use crate::error::{Error, Result};
use crate::graph::TaskGraph;
use crate::resilience::with_retry;
use crate::validation::{graph_warnings, ValidationReport};
use tracing::info;

/// Integrity expectations for one recovery.
#[derive(Debug, Clone, Default)]
pub struct RecoveryOptions {
    /// SHA-256 the fetched bytes must hash to
    pub expected_checksum: Option<String>,
    /// HMAC-SHA256 signature over the fetched bytes
    pub signature: Option<String>,
    /// Key the signature is checked with
    pub signing_key: Option<Vec<u8>>,
    /// Retry limit for the fetch and validate sequence
    pub max_retries: u32,
}

/// A graph rebuilt from a snapshot.
#[derive(Debug, Clone)]
pub struct RecoveredGraph {
    /// Normalized snapshot
    pub snapshot: ArtifactSnapshot,
    /// Graph over the snapshot's tasks
    pub graph: TaskGraph,
    /// Structural and graph-level warnings
    pub warnings: ValidationReport,
    /// Whether the snapshot was in a legacy shape
    pub legacy: bool,
    /// SHA-256 of the fetched bytes
    pub checksum: String,
}

/// Fetches and validates snapshots.
pub struct ArtifactRecovery<'a> {
    source: &'a dyn ArtifactSource,
    options: RecoveryOptions,
}

impl<'a> ArtifactRecovery<'a> {
    /// Create a recovery over `source`.
    pub fn new(source: &'a dyn ArtifactSource, options: RecoveryOptions) -> Self {
        Self { source, options }
    }

    /// Recover the graph stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ChecksumMismatch` or `Error::SignatureMismatch` when
    /// the bytes fail an integrity check, `Error::InvalidArtifact` for an
    /// unusable document, `Error::Config` when a signature is given without
    /// a key, and the last fetch error once retries are exhausted.
    pub async fn recover(&self, location: &ArtifactLocation) -> Result<RecoveredGraph> {
        let label = format!("recover artifact {location}");
        let recovered = with_retry(&label, self.options.max_retries, || {
            self.attempt(location)
        })
        .await?;

        info!(
            %location,
            tasks = recovered.graph.len(),
            legacy = recovered.legacy,
            warnings = recovered.warnings.warnings.len(),
            "Recovered task graph from artifact"
        );
        Ok(recovered)
    }

    async fn attempt(&self, location: &ArtifactLocation) -> Result<RecoveredGraph> {
        let bytes = self.source.fetch(location).await?;

        if let Some(expected) = &self.options.expected_checksum {
            verify_checksum(&bytes, expected)?;
        }
        if let Some(signature) = &self.options.signature {
            let key = self.options.signing_key.as_deref().ok_or_else(|| {
                Error::Config("artifact signature given but no signing key configured".into())
            })?;
            verify_signature(&bytes, signature, key)?;
        }

        let parsed = parse_snapshot(&bytes)?;
        let graph = TaskGraph::new(parsed.snapshot.tasks().to_vec())
            .map_err(|e| Error::InvalidArtifact(e.to_string()))?;

        let mut warnings = parsed.warnings;
        warnings.warnings.extend(graph_warnings(&graph).warnings);

        Ok(RecoveredGraph {
            snapshot: parsed.snapshot,
            graph,
            warnings,
            legacy: parsed.legacy,
            checksum: sha256_hex(&bytes),
        })
    }
}
