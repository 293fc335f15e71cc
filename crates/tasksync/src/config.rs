//! Configuration file handling.
//!
//! The configuration lives in `.tasksync/config.yaml`:
//!
//! ```yaml
//! repository: acme/roadmap
//! label: taskmaster
//! batch-size: 10
//! batch-delay-ms: 100
//! hierarchy: auto
//! retention:
//!   max-age-days: 30
//!   max-count: 20
//! generator:
//!   program: task-master
//!   args: [parse-prd, --json]
//!   complexity-threshold: 7
//! ```
//!
//! Every key is optional. The API token is never read from the file.

use crate::artifact::RetentionPolicy;
use crate::error::{Error, Result};
use crate::generator::GeneratorSettings;
use crate::sync::SyncOptions;
use crate::tracker::{HierarchyMode, HierarchySetting, DEFAULT_API_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Name of the tasksync directory
pub const TASKSYNC_DIR_NAME: &str = ".tasksync";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Environment variable holding the tracker API token
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Environment variable holding the artifact signing key
pub const SIGNING_KEY_ENV_VAR: &str = "TASKSYNC_SIGNING_KEY";

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    Path::new(TASKSYNC_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Snapshot retention section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetentionConfig {
    /// Days a snapshot is kept
    pub max_age_days: u32,
    /// Snapshots kept at most
    pub max_count: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let policy = RetentionPolicy::default();
        Self {
            max_age_days: policy.max_age,
            max_count: policy.max_count,
        }
    }
}

impl From<RetentionConfig> for RetentionPolicy {
    fn from(config: RetentionConfig) -> Self {
        Self {
            max_age: config.max_age_days,
            max_count: config.max_count,
        }
    }
}

/// Configuration file structure for tasksync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TasksyncConfig {
    /// Target repository as `owner/name`
    pub repository: Option<String>,
    /// Tracker API base URL
    pub api_url: String,
    /// Fixed tag applied to every managed issue
    pub label: String,
    /// Content ledger file
    pub state_file: PathBuf,
    /// Remote calls in flight per batch
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
    /// Caller-side retry ceiling
    pub max_retries: u32,
    /// Sub-issue linking behaviour
    pub hierarchy: HierarchySetting,
    /// Directory holding artifact snapshots
    pub artifact_dir: PathBuf,
    /// Snapshot retention
    pub retention: RetentionConfig,
    /// External graph generator
    pub generator: GeneratorSettings,
}

impl Default for TasksyncConfig {
    fn default() -> Self {
        let tasksync_dir = Path::new(TASKSYNC_DIR_NAME);
        Self {
            repository: None,
            api_url: DEFAULT_API_URL.to_string(),
            label: "taskmaster".to_string(),
            state_file: tasksync_dir.join("state.json"),
            batch_size: 10,
            batch_delay_ms: 100,
            max_retries: 10,
            hierarchy: HierarchySetting::default(),
            artifact_dir: tasksync_dir.join("artifacts"),
            retention: RetentionConfig::default(),
            generator: GeneratorSettings::default(),
        }
    }
}

impl TasksyncConfig {
    /// Load configuration from a file; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is not valid YAML or fails
    /// [`TasksyncConfig::validate`].
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid YAML or values.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and formats.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch-size must be at least 1".to_string()));
        }
        if self.label.trim().is_empty() {
            return Err(Error::Config("label cannot be empty".to_string()));
        }
        if let Some(repository) = &self.repository {
            validate_repository(repository)?;
        }
        Ok(())
    }

    /// The configured repository.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no repository is configured.
    pub fn require_repository(&self) -> Result<&str> {
        self.repository
            .as_deref()
            .ok_or_else(|| Error::Config("no repository configured".to_string()))
    }

    /// Sync tunables, with the hierarchy mode already resolved.
    pub fn sync_options(&self, hierarchy: HierarchyMode) -> SyncOptions {
        SyncOptions {
            label: self.label.clone(),
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            max_retries: self.max_retries,
            hierarchy,
        }
    }

    /// Retention policy for snapshots
    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention.into()
    }
}

/// Check an `owner/name` repository reference.
///
/// # Errors
///
/// Returns `Error::Config` if either half is empty, there are more than two
/// segments, or a segment contains characters GitHub does not allow.
pub fn validate_repository(repository: &str) -> Result<()> {
    let valid_segment = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };

    match repository.split_once('/') {
        Some((owner, name)) if valid_segment(owner) && valid_segment(name) => Ok(()),
        _ => Err(Error::Config(format!(
            "repository must be 'owner/name', got '{repository}'"
        ))),
    }
}

/// Turn the raw value of the token variable into a token.
///
/// # Errors
///
/// Returns `Error::Config` if the variable is unset or blank.
pub fn token_from(value: Option<String>) -> Result<String> {
    match value {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(Error::Config(format!("{TOKEN_ENV_VAR} is not set"))),
    }
}

/// Read the tracker API token from the environment.
///
/// # Errors
///
/// Returns `Error::Config` if `GITHUB_TOKEN` is unset or blank.
pub fn token_from_env() -> Result<String> {
    token_from(std::env::var(TOKEN_ENV_VAR).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(
            TasksyncConfig::from_yaml("").unwrap(),
            TasksyncConfig::default()
        );
    }

    #[test]
    fn test_kebab_case_keys() {
        let config = TasksyncConfig::from_yaml(
            "repository: acme/roadmap\n\
             batch-size: 4\n\
             batch-delay-ms: 250\n\
             hierarchy: comment\n\
             retention:\n  max-age-days: 7\n\
             generator:\n  complexity-threshold: 9\n",
        )
        .unwrap();

        assert_eq!(config.repository.as_deref(), Some("acme/roadmap"));
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.hierarchy, HierarchySetting::Comment);
        assert_eq!(config.retention.max_age_days, 7);
        assert_eq!(config.retention.max_count, 20);
        assert_eq!(config.generator.complexity_threshold, 9);
        assert_eq!(config.generator.program, "task-master");

        let options = config.sync_options(HierarchyMode::CommentFallback);
        assert_eq!(options.batch_delay, Duration::from_millis(250));
        assert_eq!(options.label, "taskmaster");
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let err = TasksyncConfig::from_yaml("batch-size: 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_hierarchy_is_rejected() {
        assert!(TasksyncConfig::from_yaml("hierarchy: sideways\n").is_err());
    }

    #[rstest]
    #[case::valid("acme/roadmap", true)]
    #[case::dots("acme/road.map", true)]
    #[case::no_slash("roadmap", false)]
    #[case::empty_owner("/roadmap", false)]
    #[case::three_segments("a/b/c", false)]
    #[case::space("acme/road map", false)]
    #[case::dotdot("acme/..", false)]
    fn test_validate_repository(#[case] repository: &str, #[case] ok: bool) {
        assert_eq!(validate_repository(repository).is_ok(), ok);
    }

    #[rstest]
    #[case::unset(None, false)]
    #[case::blank(Some("  ".to_string()), false)]
    #[case::set(Some("ghp_abc\n".to_string()), true)]
    fn test_token_from(#[case] value: Option<String>, #[case] ok: bool) {
        let token = token_from(value);
        assert_eq!(token.is_ok(), ok);
        if let Ok(token) = token {
            assert_eq!(token, "ghp_abc");
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = TasksyncConfig::load(&temp.path().join("config.yaml"))
            .await
            .unwrap();
        assert_eq!(config, TasksyncConfig::default());
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "label: roadmap\nmax-retries: 3\n").unwrap();

        let config = TasksyncConfig::load(&path).await.unwrap();
        assert_eq!(config.label, "roadmap");
        assert_eq!(config.max_retries, 3);
    }
}
