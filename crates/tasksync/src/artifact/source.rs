//! Where snapshot bytes come from.

use crate::error::{Error, Result, TrackerError};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// A snapshot location: a URL or an opaque id in the artifact directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Downloadable over HTTP(S)
    Url(Url),
    /// Resolved to `<artifact-dir>/<id>.json`
    Id(String),
}

impl FromStr for ArtifactLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            return Url::parse(s)
                .map(Self::Url)
                .map_err(|e| Error::InvalidArtifact(format!("invalid artifact URL '{s}': {e}")));
        }

        let id = s.strip_suffix(".json").unwrap_or(s);
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(Self::Id(id.to_string()))
        } else {
            Err(Error::InvalidArtifact(format!(
                "'{s}' is neither an http(s) URL nor an artifact id"
            )))
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Fetches raw snapshot bytes.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetch the bytes stored at `location`.
    async fn fetch(&self, location: &ArtifactLocation) -> Result<Vec<u8>>;
}

/// Resolves ids against a local directory and downloads URLs.
#[derive(Debug, Clone)]
pub struct DefaultSource {
    dir: PathBuf,
    client: Client,
}

impl DefaultSource {
    /// Create a source rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            dir: dir.into(),
            client,
        })
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::status(
                status.as_u16(),
                format!("artifact download from {url} failed"),
            )
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ArtifactSource for DefaultSource {
    async fn fetch(&self, location: &ArtifactLocation) -> Result<Vec<u8>> {
        debug!(%location, "Fetching artifact");
        match location {
            ArtifactLocation::Url(url) => self.download(url).await,
            ArtifactLocation::Id(id) => {
                let path = self.dir.join(format!("{id}.json"));
                tokio::fs::read(&path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::InvalidArtifact(format!("no artifact at {}", path.display()))
                    } else {
                        Error::Io(e)
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case::https("https://example.com/a.json", true)]
    #[case::http("http://localhost:8080/a.json", true)]
    #[case::id("snapshot-20261016T120000.000Z", false)]
    #[case::id_with_suffix("nightly.json", false)]
    fn test_parse_locations(#[case] raw: &str, #[case] is_url: bool) {
        let location: ArtifactLocation = raw.parse().unwrap();
        assert_eq!(matches!(location, ArtifactLocation::Url(_)), is_url);
    }

    #[rstest]
    #[case::traversal("../secrets")]
    #[case::nested("a/b")]
    #[case::empty("")]
    #[case::hidden(".hidden")]
    fn test_rejects_unsafe_ids(#[case] raw: &str) {
        assert!(raw.parse::<ArtifactLocation>().is_err());
    }

    #[tokio::test]
    async fn test_fetch_by_id_reads_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("nightly.json"), b"{}").unwrap();
        let source = DefaultSource::new(temp.path()).unwrap();

        let bytes = source
            .fetch(&"nightly".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn test_missing_id_is_invalid_artifact() {
        let temp = TempDir::new().unwrap();
        let source = DefaultSource::new(temp.path()).unwrap();
        let err = source.fetch(&"missing".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArtifact(_)));
    }
}
