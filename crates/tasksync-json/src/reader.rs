//! Reading JSON state files.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::Path;

/// Reads and parses a JSON document from `path`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read (including when it does
/// not exist) and [`Error::InvalidFormat`] if it does not parse as `T`.
pub async fn read_json<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    parse(path, &bytes)
}

/// Reads and parses a JSON document, treating a missing file as `None`.
///
/// First runs have no state yet; that is not an error.
///
/// # Errors
///
/// Returns an error for any IO failure other than `NotFound`, and for
/// documents that do not parse as `T`.
pub async fn read_json_optional<T, P>(path: P) -> Result<Option<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match tokio::fs::read(path).await {
        Ok(bytes) => parse(path, &bytes).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "State file absent");
            Ok(None)
        }
        Err(e) => Err(Error::Io(e)),
    }
}

fn parse<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::InvalidFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempdir().unwrap();
        let result: Option<HashMap<String, String>> =
            read_json_optional(dir.path().join("absent.json")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn invalid_document_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = read_json::<HashMap<String, String>, _>(&path)
            .await
            .unwrap_err();
        match err {
            Error::InvalidFormat { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
