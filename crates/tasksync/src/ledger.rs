//! Content-hash ledger.
//!
//! Maps an issue title to the SHA-256 of the title and body last written to
//! that issue. The ledger is persisted as a flat JSON object so that a
//! later run can tell "nothing changed" apart from "must write" without
//! fetching the issue, and can recognise a task it already created even
//! when the title lookup misses.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistent map of issue title to last-written content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentLedger {
    entries: HashMap<String, String>,
    path: Option<PathBuf>,
    dirty: bool,
}

/// SHA-256 of `title` followed by `body`, as lowercase hex.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ContentLedger {
    /// An empty ledger that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the ledger stored at `path`.
    ///
    /// A missing file yields an empty ledger bound to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object of strings.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let entries: HashMap<String, String> =
            tasksync_json::read_json_optional(path).await?.unwrap_or_default();
        debug!(path = %path.display(), entries = entries.len(), "Loaded content ledger");

        Ok(Self {
            entries,
            path: Some(path.to_path_buf()),
            dirty: false,
        })
    }

    /// Number of recorded issues
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an issue with this title was synced by an earlier run
    pub fn contains(&self, title: &str) -> bool {
        self.entries.contains_key(title)
    }

    /// Whether `title` and `body` hash to the recorded value.
    pub fn is_unchanged(&self, title: &str, body: &str) -> bool {
        self.entries
            .get(title)
            .is_some_and(|recorded| *recorded == content_hash(title, body))
    }

    /// Record the content just written under `title`.
    pub fn record(&mut self, title: &str, body: &str) {
        let hash = content_hash(title, body);
        if self.entries.get(title) != Some(&hash) {
            self.entries.insert(title.to_string(), hash);
            self.dirty = true;
        }
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the ledger if it is bound to a file and has changes.
    ///
    /// Keys are written in sorted order so the file diffs cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if the atomic write fails.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let sorted: BTreeMap<&String, &String> = self.entries.iter().collect();
        tasksync_json::write_json_atomic(path, &sorted).await?;
        self.dirty = false;
        debug!(path = %path.display(), entries = self.entries.len(), "Flushed content ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_is_lowercase_hex() {
        let hash = content_hash("title", "body");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_ne!(hash, content_hash("title", "body2"));
    }

    #[test]
    fn test_unchanged_detection() {
        let mut ledger = ContentLedger::in_memory();
        assert!(!ledger.is_unchanged("t", "b"));

        ledger.record("t", "b");
        assert!(ledger.is_unchanged("t", "b"));
        assert!(!ledger.is_unchanged("t", "b2"));
        assert!(ledger.contains("t"));
        assert!(!ledger.contains("other"));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_ledger() {
        let temp = TempDir::new().unwrap();
        let ledger = ContentLedger::load(temp.path().join("hashes.json")).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("hashes.json");

        let mut ledger = ContentLedger::load(&path).await.unwrap();
        ledger.record("Beta", "body b");
        ledger.record("Alpha", "body a");
        ledger.flush().await.unwrap();
        assert!(!ledger.is_dirty());

        let reloaded = ContentLedger::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.is_unchanged("Alpha", "body a"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.find("Alpha").unwrap() < raw.find("Beta").unwrap());
    }

    #[tokio::test]
    async fn test_rerecording_same_content_stays_clean() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hashes.json");
        let mut ledger = ContentLedger::load(&path).await.unwrap();
        ledger.record("a", "b");
        ledger.flush().await.unwrap();

        ledger.record("a", "b");
        assert!(!ledger.is_dirty());
    }
}
