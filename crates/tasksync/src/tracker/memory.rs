//! In-memory issue tracker.
//!
//! Holds issues in a `BTreeMap` behind `Arc<Mutex<_>>`. Used by
//! `sync --dry-run` and by the test suites, which rely on the call counters
//! and the failure-injection hooks to observe what the sync core asked for.

use super::IssueTracker;
use crate::domain::{IssueNumber, IssueState, NewRemoteIssue, RemoteIssue, StateFilter};
use crate::error::{Result, TrackerError};
use crate::render::parse_sub_issue_comment;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Offset between issue numbers and the tracker-internal ids it hands out.
const INTERNAL_ID_OFFSET: u64 = 1_000_000;

/// Number of calls made per tracker operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `get_issue`
    pub get: usize,
    /// `create_issue`
    pub create: usize,
    /// `update_issue_body`
    pub update: usize,
    /// `add_label`
    pub add_label: usize,
    /// `remove_label`
    pub remove_label: usize,
    /// `create_comment`
    pub comment: usize,
    /// `list_issues`
    pub list: usize,
    /// `add_sub_issue`
    pub sub_issue: usize,
    /// `linked_children`
    pub linked_children: usize,
}

impl CallCounts {
    /// Calls that modify remote state
    pub fn writes(&self) -> usize {
        self.create + self.update + self.add_label + self.remove_label + self.comment + self.sub_issue
    }
}

#[derive(Debug, Default)]
struct Failures {
    /// Fail the next N calls of any kind
    next_calls: usize,
    next_error: Option<TrackerError>,
    /// Fail every `get_issue` for these numbers
    get: HashMap<u64, TrackerError>,
    /// Fail every `create_issue` with these titles
    create: HashMap<String, TrackerError>,
    /// Fail every `add_sub_issue`
    sub_issue: Option<TrackerError>,
    /// Fail every `create_comment`
    comment: Option<TrackerError>,
}

#[derive(Debug)]
struct Inner {
    issues: BTreeMap<u64, RemoteIssue>,
    comments: Vec<(IssueNumber, String)>,
    sub_issues: Vec<(IssueNumber, IssueNumber)>,
    next_number: u64,
    sub_issue_support: bool,
    calls: CallCounts,
    failures: Failures,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            issues: BTreeMap::new(),
            comments: Vec::new(),
            sub_issues: Vec::new(),
            next_number: 1,
            sub_issue_support: true,
            calls: CallCounts::default(),
            failures: Failures::default(),
        }
    }
}

impl Inner {
    fn injected(&mut self) -> Result<()> {
        if self.failures.next_calls > 0 {
            self.failures.next_calls -= 1;
            let err = self.failures.next_error.clone().unwrap_or_default();
            return Err(err.into());
        }
        Ok(())
    }

    fn issue_mut(&mut self, number: IssueNumber) -> Result<&mut RemoteIssue> {
        self.issues
            .get_mut(&number.get())
            .ok_or_else(|| TrackerError::status(404, format!("issue {number} not found")).into())
    }

    fn insert(&mut self, title: &str, body: &str, labels: Vec<String>) -> RemoteIssue {
        let number = self.next_number;
        self.next_number += 1;
        let issue = RemoteIssue {
            id: INTERNAL_ID_OFFSET + number,
            number: IssueNumber(number),
            title: title.to_string(),
            body: body.to_string(),
            state: IssueState::Open,
            labels,
        };
        self.issues.insert(number, issue.clone());
        issue
    }

    fn set_state(&mut self, number: IssueNumber, state: IssueState) {
        if let Some(issue) = self.issues.get_mut(&number.get()) {
            issue.state = state;
        }
    }
}

/// An issue tracker living entirely in memory.
///
/// Cloning shares the underlying store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTracker {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTracker {
    /// Create an empty tracker with native sub-issue support enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an issue directly, bypassing call counting.
    pub async fn insert_issue(&self, title: &str, body: &str, labels: &[&str]) -> RemoteIssue {
        let labels = labels.iter().map(ToString::to_string).collect();
        self.inner.lock().await.insert(title, body, labels)
    }

    /// Snapshot of one issue
    pub async fn issue(&self, number: IssueNumber) -> Option<RemoteIssue> {
        self.inner.lock().await.issues.get(&number.get()).cloned()
    }

    /// Snapshot of every issue, in number order
    pub async fn issues(&self) -> Vec<RemoteIssue> {
        self.inner.lock().await.issues.values().cloned().collect()
    }

    /// Close an issue (as a user would in the tracker UI).
    pub async fn close(&self, number: IssueNumber) {
        self.inner.lock().await.set_state(number, IssueState::Closed);
    }

    /// Reopen an issue.
    pub async fn reopen(&self, number: IssueNumber) {
        self.inner.lock().await.set_state(number, IssueState::Open);
    }

    /// Comments posted on an issue, oldest first
    pub async fn comments(&self, number: IssueNumber) -> Vec<String> {
        self.inner
            .lock()
            .await
            .comments
            .iter()
            .filter(|(n, _)| *n == number)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Native `(parent, child)` links, in creation order
    pub async fn sub_issue_links(&self) -> Vec<(IssueNumber, IssueNumber)> {
        self.inner.lock().await.sub_issues.clone()
    }

    /// Current call counters
    pub async fn calls(&self) -> CallCounts {
        self.inner.lock().await.calls
    }

    /// Zero the call counters.
    pub async fn reset_calls(&self) {
        self.inner.lock().await.calls = CallCounts::default();
    }

    /// Whether the capability check reports native sub-issue support.
    pub async fn set_sub_issue_support(&self, supported: bool) {
        self.inner.lock().await.sub_issue_support = supported;
    }

    /// Fail the next `count` calls, whatever they are, with `error`.
    pub async fn fail_next_calls(&self, count: usize, error: TrackerError) {
        let mut inner = self.inner.lock().await;
        inner.failures.next_calls = count;
        inner.failures.next_error = Some(error);
    }

    /// Fail every fetch of `number` with `error`.
    pub async fn fail_get(&self, number: IssueNumber, error: TrackerError) {
        self.inner.lock().await.failures.get.insert(number.get(), error);
    }

    /// Fail every creation of an issue titled `title` with `error`.
    pub async fn fail_create(&self, title: &str, error: TrackerError) {
        self.inner
            .lock()
            .await
            .failures
            .create
            .insert(title.to_string(), error);
    }

    /// Fail every native sub-issue call with `error`.
    pub async fn fail_sub_issues(&self, error: TrackerError) {
        self.inner.lock().await.failures.sub_issue = Some(error);
    }

    /// Fail every comment with `error`.
    pub async fn fail_comments(&self, error: TrackerError) {
        self.inner.lock().await.failures.comment = Some(error);
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.inner.lock().await.failures = Failures::default();
    }
}

#[async_trait]
impl IssueTracker for InMemoryTracker {
    async fn get_issue(&self, number: IssueNumber) -> Result<RemoteIssue> {
        let mut inner = self.inner.lock().await;
        inner.calls.get += 1;
        inner.injected()?;
        if let Some(err) = inner.failures.get.get(&number.get()) {
            return Err(err.clone().into());
        }
        inner.issue_mut(number).map(|issue| issue.clone())
    }

    async fn create_issue(&self, issue: NewRemoteIssue) -> Result<RemoteIssue> {
        let mut inner = self.inner.lock().await;
        inner.calls.create += 1;
        inner.injected()?;
        if let Some(err) = inner.failures.create.get(&issue.title) {
            return Err(err.clone().into());
        }
        Ok(inner.insert(&issue.title, &issue.body, issue.labels))
    }

    async fn update_issue_body(&self, number: IssueNumber, body: &str) -> Result<RemoteIssue> {
        let mut inner = self.inner.lock().await;
        inner.calls.update += 1;
        inner.injected()?;
        let issue = inner.issue_mut(number)?;
        issue.body = body.to_string();
        Ok(issue.clone())
    }

    async fn add_label(&self, number: IssueNumber, label: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.add_label += 1;
        inner.injected()?;
        let issue = inner.issue_mut(number)?;
        if !issue.has_label(label) {
            issue.labels.push(label.to_string());
        }
        Ok(())
    }

    async fn remove_label(&self, number: IssueNumber, label: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.remove_label += 1;
        inner.injected()?;
        inner.issue_mut(number)?.labels.retain(|l| l != label);
        Ok(())
    }

    async fn create_comment(&self, number: IssueNumber, body: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.comment += 1;
        inner.injected()?;
        if let Some(err) = &inner.failures.comment {
            return Err(err.clone().into());
        }
        inner.issue_mut(number)?;
        inner.comments.push((number, body.to_string()));
        Ok(())
    }

    async fn list_issues(
        &self,
        state: StateFilter,
        label: Option<&str>,
    ) -> Result<Vec<RemoteIssue>> {
        let mut inner = self.inner.lock().await;
        inner.calls.list += 1;
        inner.injected()?;
        Ok(inner
            .issues
            .values()
            .filter(|issue| state.matches(issue.state))
            .filter(|issue| label.is_none_or(|l| issue.has_label(l)))
            .cloned()
            .collect())
    }

    async fn add_sub_issue(&self, parent: IssueNumber, child: &RemoteIssue) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.sub_issue += 1;
        inner.injected()?;
        if let Some(err) = &inner.failures.sub_issue {
            return Err(err.clone().into());
        }
        if !inner.sub_issue_support {
            return Err(TrackerError::status(404, "sub-issues are not enabled").into());
        }
        inner.issue_mut(parent)?;
        inner.sub_issues.push((parent, child.number));
        Ok(())
    }

    async fn linked_children(&self, parent: IssueNumber) -> Result<Vec<IssueNumber>> {
        let mut inner = self.inner.lock().await;
        inner.calls.linked_children += 1;
        inner.injected()?;
        inner.issue_mut(parent)?;

        let native = inner
            .sub_issues
            .iter()
            .filter(|(p, _)| *p == parent)
            .map(|(_, child)| *child);
        let commented = inner
            .comments
            .iter()
            .filter(|(n, _)| *n == parent)
            .filter_map(|(_, body)| parse_sub_issue_comment(body));
        Ok(native.chain(commented).collect())
    }

    async fn supports_sub_issues(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        inner.injected()?;
        Ok(inner.sub_issue_support)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::render::sub_issue_comment;

    fn new_issue(title: &str) -> NewRemoteIssue {
        NewRemoteIssue {
            title: title.to_string(),
            body: "body".to_string(),
            labels: vec!["taskmaster".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_numbers() {
        let tracker = InMemoryTracker::new();
        let a = tracker.create_issue(new_issue("a")).await.unwrap();
        let b = tracker.create_issue(new_issue("b")).await.unwrap();

        assert_eq!(a.number, IssueNumber(1));
        assert_eq!(b.number, IssueNumber(2));
        assert_ne!(a.id, b.id);
        assert_eq!(tracker.calls().await.create, 2);
    }

    #[tokio::test]
    async fn test_label_operations_are_idempotent() {
        let tracker = InMemoryTracker::new();
        let issue = tracker.create_issue(new_issue("a")).await.unwrap();

        tracker.add_label(issue.number, "blocked").await.unwrap();
        tracker.add_label(issue.number, "blocked").await.unwrap();
        let fetched = tracker.get_issue(issue.number).await.unwrap();
        assert_eq!(fetched.labels.iter().filter(|l| *l == "blocked").count(), 1);

        tracker.remove_label(issue.number, "blocked").await.unwrap();
        tracker.remove_label(issue.number, "blocked").await.unwrap();
        assert!(!tracker.get_issue(issue.number).await.unwrap().has_label("blocked"));
    }

    #[tokio::test]
    async fn test_list_filters_by_state_and_label() {
        let tracker = InMemoryTracker::new();
        let a = tracker.insert_issue("a", "", &["taskmaster"]).await;
        tracker.insert_issue("b", "", &[]).await;
        let c = tracker.insert_issue("c", "", &["taskmaster"]).await;
        tracker.close(c.number).await;

        let open = tracker
            .list_issues(StateFilter::Open, Some("taskmaster"))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].number, a.number);

        let all = tracker.list_issues(StateFilter::All, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_issue_is_404() {
        let tracker = InMemoryTracker::new();
        match tracker.get_issue(IssueNumber(42)).await.unwrap_err() {
            Error::Tracker(e) => assert_eq!(e.status, Some(404)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let tracker = InMemoryTracker::new();
        let issue = tracker.insert_issue("a", "", &[]).await;

        tracker
            .fail_get(issue.number, TrackerError::status(502, "Bad Gateway"))
            .await;
        assert!(tracker.get_issue(issue.number).await.is_err());

        tracker.clear_failures().await;
        assert!(tracker.get_issue(issue.number).await.is_ok());

        tracker
            .fail_next_calls(1, TrackerError::status(500, "boom"))
            .await;
        assert!(tracker.get_issue(issue.number).await.is_err());
        assert!(tracker.get_issue(issue.number).await.is_ok());
    }

    #[tokio::test]
    async fn test_sub_issue_links_recorded() {
        let tracker = InMemoryTracker::new();
        let parent = tracker.insert_issue("p", "", &[]).await;
        let child = tracker.insert_issue("c", "", &[]).await;

        tracker.add_sub_issue(parent.number, &child).await.unwrap();
        assert_eq!(
            tracker.sub_issue_links().await,
            vec![(parent.number, child.number)]
        );

        tracker.set_sub_issue_support(false).await;
        assert!(tracker.add_sub_issue(parent.number, &child).await.is_err());
    }

    #[tokio::test]
    async fn test_linked_children_include_comment_links() {
        let tracker = InMemoryTracker::new();
        let parent = tracker.insert_issue("p", "", &[]).await;
        let native = tracker.insert_issue("a", "", &[]).await;
        let commented = tracker.insert_issue("b", "", &[]).await;

        tracker.add_sub_issue(parent.number, &native).await.unwrap();
        tracker
            .create_comment(parent.number, &sub_issue_comment(commented.number))
            .await
            .unwrap();
        tracker.create_comment(parent.number, "unrelated").await.unwrap();

        assert_eq!(
            tracker.linked_children(parent.number).await.unwrap(),
            vec![native.number, commented.number]
        );
        assert!(tracker.linked_children(native.number).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_failure_injection() {
        let tracker = InMemoryTracker::new();
        let issue = tracker.insert_issue("a", "", &[]).await;

        tracker
            .fail_comments(TrackerError::status(403, "Resource not accessible"))
            .await;
        assert!(tracker.create_comment(issue.number, "hi").await.is_err());
        assert!(tracker.comments(issue.number).await.is_empty());
    }
}
