//! Atomic write operations for JSON state files.
//!
//! Writes go to a sibling temporary file first, which is flushed, synced and
//! then renamed over the target. On POSIX systems a rename within one
//! filesystem is atomic, so readers observe either the previous document or
//! the new one, never a truncated mix.
//!
//! # Examples
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use tasksync_json::write_json_atomic;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut hashes = BTreeMap::new();
//! hashes.insert("Set up CI".to_string(), "9f86d081".to_string());
//! write_json_atomic(".tasksync/state.json", &hashes).await?;
//! # Ok(())
//! # }
//! ```

use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Atomically writes `value` to `path` as pretty-printed JSON.
///
/// The document ends with a trailing newline so that the file diffs cleanly
/// when it is committed alongside the task graph. Missing parent directories
/// are created.
///
/// # Errors
///
/// Returns an error if serialization fails, the temporary file cannot be
/// written, or the final rename fails. On failure the original file (if any)
/// is left unchanged.
pub async fn write_json_atomic<T, P>(path: P, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes).await
}

/// Atomically writes raw bytes to `path`.
///
/// Used for artifact snapshots, whose checksum is computed over the exact
/// bytes that land on disk.
///
/// # Errors
///
/// See [`write_json_atomic`].
pub async fn write_bytes_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = make_temp_path(path);

    if let Err(e) = write_to_temp_file(&temp_path, bytes).await {
        // Best-effort cleanup; the original file is untouched either way.
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&temp_path, path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote state file");
    Ok(())
}

/// Appends `.tmp` to the file name, keeping any existing extension.
fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}

async fn write_to_temp_file(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn make_temp_path_with_extension() {
        let temp = make_temp_path(Path::new("/state/state.json"));
        assert_eq!(temp, Path::new("/state/state.json.tmp"));
    }

    #[test]
    fn make_temp_path_without_extension() {
        let temp = make_temp_path(Path::new("/state/ledger"));
        assert_eq!(temp, Path::new("/state/ledger.tmp"));
    }

    #[tokio::test]
    async fn write_json_atomic_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("state.json");

        let mut map = BTreeMap::new();
        map.insert("a", "1");
        write_json_atomic(&target, &map).await.unwrap();

        let contents = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(contents, "{\n  \"a\": \"1\"\n}\n");
        assert!(!make_temp_path(&target).exists());
    }

    #[tokio::test]
    async fn write_bytes_atomic_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("snapshot.json");

        write_bytes_atomic(&target, b"old").await.unwrap();
        write_bytes_atomic(&target, b"new contents").await.unwrap();

        let contents = tokio::fs::read(&target).await.unwrap();
        assert_eq!(contents, b"new contents");
    }
}
