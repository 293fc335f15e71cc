//! Local snapshot directory with retention.

use super::snapshot::{ArtifactSnapshot, RetentionPolicy};
use super::verify::sha256_hex;
use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const ID_PREFIX: &str = "snapshot-";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// A snapshot written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Opaque id, usable as a recovery location
    pub id: String,
    /// File path
    pub path: PathBuf,
    /// SHA-256 of the file bytes
    pub checksum: String,
}

/// Writes snapshots into a directory and prunes old ones.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl ArtifactStore {
    /// Create a store over `dir` with the given retention.
    pub fn new(dir: impl Into<PathBuf>, retention: RetentionPolicy) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    /// File path for an id
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write `snapshot` atomically, named after its generation timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized or written.
    pub async fn write(&self, snapshot: &ArtifactSnapshot) -> Result<StoredArtifact> {
        let stamp = snapshot.metadata.generation_timestamp.format(STAMP_FORMAT);
        let id = format!("{ID_PREFIX}{stamp}");
        let path = self.path_for(&id);

        let mut bytes = serde_json::to_vec_pretty(snapshot)?;
        bytes.push(b'\n');
        tasksync_json::write_bytes_atomic(&path, &bytes).await?;

        let checksum = sha256_hex(&bytes);
        info!(id = %id, tasks = snapshot.metadata.task_count, "Wrote artifact snapshot");
        Ok(StoredArtifact { id, path, checksum })
    }

    /// Stored snapshots, newest first.
    ///
    /// Files not named by [`ArtifactStore::write`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub async fn list(&self) -> Result<Vec<(DateTime<Utc>, PathBuf)>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(stamp) = parse_stamp(&path) {
                snapshots.push((stamp, path));
            }
        }
        snapshots.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(snapshots)
    }

    /// Delete snapshots older than the retention age or beyond its count.
    ///
    /// A snapshot that fails to delete is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let cutoff = now - ChronoDuration::days(i64::from(self.retention.max_age));
        let mut removed = Vec::new();

        for (position, (stamp, path)) in self.list().await?.into_iter().enumerate() {
            if position < self.retention.max_count && stamp >= cutoff {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Pruned snapshot");
                    removed.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to prune snapshot"),
            }
        }

        if !removed.is_empty() {
            info!(removed = removed.len(), "Applied snapshot retention");
        }
        Ok(removed)
    }
}

fn parse_stamp(path: &Path) -> Option<DateTime<Utc>> {
    if path.extension()? != "json" {
        return None;
    }
    let stamp = path.file_stem()?.to_str()?.strip_prefix(ID_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::snapshot::parse_snapshot;
    use crate::domain::Task;
    use crate::graph::TaskGraph;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn snapshot_at(at: DateTime<Utc>) -> ArtifactSnapshot {
        let graph = TaskGraph::new(vec![Task::new(1, "Schema")]).unwrap();
        ArtifactSnapshot::from_graph(&graph, vec![], RetentionPolicy::default(), at).unwrap()
    }

    #[tokio::test]
    async fn test_write_names_file_by_timestamp() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path(), RetentionPolicy::default());
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();

        let stored = store.write(&snapshot_at(at)).await.unwrap();
        assert_eq!(stored.id, "snapshot-20261016T120000.000Z");
        assert!(stored.path.exists());

        let bytes = std::fs::read(&stored.path).unwrap();
        assert_eq!(stored.checksum, sha256_hex(&bytes));
        assert!(parse_snapshot(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_prune_by_count_and_age() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(
            temp.path(),
            RetentionPolicy {
                max_age: 10,
                max_count: 2,
            },
        );
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        for days_ago in [0, 1, 2, 30] {
            store
                .write(&snapshot_at(now - ChronoDuration::days(days_ago)))
                .await
                .unwrap();
        }
        std::fs::write(temp.path().join("notes.json"), b"{}").unwrap();

        let removed = store.prune(now).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.list().await.unwrap().len(), 2);
        assert!(temp.path().join("notes.json").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("absent"), RetentionPolicy::default());
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.prune(Utc::now()).await.unwrap().is_empty());
    }
}
