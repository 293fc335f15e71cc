//! Remote issue tracker abstraction.
//!
//! The sync engine, the blocked-state resolver and the watcher entry points
//! only talk to the tracker through [`IssueTracker`]. Two implementations
//! exist:
//!
//! - [`github::GitHubTracker`]: the GitHub REST API over `reqwest`
//! - [`memory::InMemoryTracker`]: an in-process tracker used for dry runs
//!   and tests, with call counting and failure injection
//!
//! All methods take `&self` so a batch of calls can be in flight at once;
//! implementations synchronize internally.

pub mod github;
pub mod memory;

use crate::domain::{IssueNumber, NewRemoteIssue, RemoteIssue, StateFilter};
use crate::error::Result;
use crate::render::has_marker;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

pub use github::{GitHubTracker, DEFAULT_API_URL};
pub use memory::InMemoryTracker;

/// Operations the sync core needs from a remote tracker.
///
/// Implementations must be `Send + Sync`. Errors are reported as
/// [`crate::error::Error::Tracker`] (the tracker answered) or
/// [`crate::error::Error::Network`] (it could not be reached) so the retry
/// executor can classify them.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch one issue.
    async fn get_issue(&self, number: IssueNumber) -> Result<RemoteIssue>;

    /// Create an issue and return it as stored.
    async fn create_issue(&self, issue: NewRemoteIssue) -> Result<RemoteIssue>;

    /// Replace an issue's body.
    async fn update_issue_body(&self, number: IssueNumber, body: &str) -> Result<RemoteIssue>;

    /// Add a label to an issue. Adding a present label is a no-op.
    async fn add_label(&self, number: IssueNumber, label: &str) -> Result<()>;

    /// Remove a label from an issue. Removing an absent label is a no-op.
    async fn remove_label(&self, number: IssueNumber, label: &str) -> Result<()>;

    /// Post a comment on an issue.
    async fn create_comment(&self, number: IssueNumber, body: &str) -> Result<()>;

    /// List issues, optionally restricted to those carrying `label`.
    async fn list_issues(&self, state: StateFilter, label: Option<&str>)
    -> Result<Vec<RemoteIssue>>;

    /// Attach `child` to `parent` using the tracker's native sub-issue API.
    async fn add_sub_issue(&self, parent: IssueNumber, child: &RemoteIssue) -> Result<()>;

    /// Children already attached to `parent`, natively or by a
    /// `Sub-issue: #N` comment.
    async fn linked_children(&self, parent: IssueNumber) -> Result<Vec<IssueNumber>>;

    /// Capability check for the native sub-issue API.
    async fn supports_sub_issues(&self) -> Result<bool>;

    /// Uncached lookup of a managed issue by exact title.
    ///
    /// Only issues whose body carries the tasksync marker match.
    async fn find_by_title(&self, title: &str, label: Option<&str>) -> Result<Option<RemoteIssue>> {
        let issues = self.list_issues(StateFilter::All, label).await?;
        Ok(issues
            .into_iter()
            .find(|issue| issue.title == title && has_marker(&issue.body)))
    }
}

/// Configured hierarchy behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchySetting {
    /// Check the tracker once at startup
    #[default]
    Auto,
    /// Always use the native sub-issue API
    Native,
    /// Always post `Sub-issue: #N` comments
    Comment,
}

/// How parent/child links are written for the rest of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyMode {
    /// Native sub-issue API, falling back to a comment per failed link
    Native,
    /// Comments only
    CommentFallback,
}

impl fmt::Display for HierarchyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::CommentFallback => f.write_str("comment-fallback"),
        }
    }
}

/// Resolve the hierarchy mode once, checking the tracker in `auto` mode.
///
/// A failed check selects comment fallback; it never aborts the run.
pub async fn resolve_hierarchy_mode(
    tracker: &dyn IssueTracker,
    setting: HierarchySetting,
) -> HierarchyMode {
    let mode = match setting {
        HierarchySetting::Native => HierarchyMode::Native,
        HierarchySetting::Comment => HierarchyMode::CommentFallback,
        HierarchySetting::Auto => match tracker.supports_sub_issues().await {
            Ok(true) => HierarchyMode::Native,
            Ok(false) => HierarchyMode::CommentFallback,
            Err(e) => {
                warn!(error = %e, "Sub-issue capability check failed, using comments");
                HierarchyMode::CommentFallback
            }
        },
    };
    info!(%mode, "Hierarchy mode selected");
    mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;

    #[tokio::test]
    async fn test_auto_mode_checks_once() {
        let tracker = InMemoryTracker::new();
        assert_eq!(
            resolve_hierarchy_mode(&tracker, HierarchySetting::Auto).await,
            HierarchyMode::Native
        );

        tracker.set_sub_issue_support(false).await;
        assert_eq!(
            resolve_hierarchy_mode(&tracker, HierarchySetting::Auto).await,
            HierarchyMode::CommentFallback
        );
    }

    #[tokio::test]
    async fn test_failed_check_falls_back_to_comments() {
        let tracker = InMemoryTracker::new();
        tracker
            .fail_next_calls(1, TrackerError::status(500, "boom"))
            .await;
        assert_eq!(
            resolve_hierarchy_mode(&tracker, HierarchySetting::Auto).await,
            HierarchyMode::CommentFallback
        );
    }

    #[tokio::test]
    async fn test_explicit_settings_skip_check() {
        let tracker = InMemoryTracker::new();
        tracker.set_sub_issue_support(false).await;
        assert_eq!(
            resolve_hierarchy_mode(&tracker, HierarchySetting::Native).await,
            HierarchyMode::Native
        );
        assert_eq!(
            resolve_hierarchy_mode(&tracker, HierarchySetting::Comment).await,
            HierarchyMode::CommentFallback
        );
    }

    #[tokio::test]
    async fn test_find_by_title_requires_marker() {
        let tracker = InMemoryTracker::new();
        tracker
            .insert_issue("Set up CI", "hand-written issue", &[])
            .await;
        assert!(tracker.find_by_title("Set up CI", None).await.unwrap().is_none());

        let managed = tracker
            .insert_issue("Set up CI", crate::render::ISSUE_MARKER, &[])
            .await;
        let found = tracker.find_by_title("Set up CI", None).await.unwrap();
        assert_eq!(found.map(|i| i.number), Some(managed.number));
    }
}
