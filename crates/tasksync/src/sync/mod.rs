//! Idempotent synchronization of a task graph to remote issues.
//!
//! A run walks the graph in four passes:
//!
//! 1. **Bind**: find or create one issue per task, with placeholder link
//!    sections.
//! 2. **Render**: now that every task has a number, render the full body
//!    with dependency, required-by and subtask checkboxes and write it only
//!    if it differs from what the tracker holds. Labels are reconciled in
//!    the same pass.
//! 3. **Link**: attach subtasks to parents natively, or with a comment.
//! 4. **Block**: reconcile the `blocked` label of every open issue.
//!
//! Run state lives in [`SyncState`]: the content ledger and the issue cache.
//! Both are passed in by the caller, only grow during a run and are updated
//! once per completed batch.

mod batch;
mod engine;

pub use batch::for_each_batch;
pub use engine::{SyncEngine, SyncOutcome};

use crate::domain::{IssueNumber, RemoteIssue, TaskId};
use crate::ledger::ContentLedger;
use crate::render::has_marker;
use crate::resilience::ErrorCategory;
use crate::tracker::HierarchyMode;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Tunables of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Fixed tag applied to every managed issue
    pub label: String,
    /// Remote calls in flight per batch
    pub batch_size: usize,
    /// Pause between batches
    pub batch_delay: Duration,
    /// Caller-side retry ceiling (further limited per error category)
    pub max_retries: u32,
    /// How subtask links are written
    pub hierarchy: HierarchyMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            label: "taskmaster".to_string(),
            batch_size: 10,
            batch_delay: Duration::from_millis(100),
            max_retries: 10,
            hierarchy: HierarchyMode::Native,
        }
    }
}

/// Managed issues by title.
#[derive(Debug, Clone, Default)]
pub struct IssueCache {
    by_title: HashMap<String, RemoteIssue>,
    warm: bool,
}

impl IssueCache {
    /// Whether the cache has been filled from a full listing
    pub fn is_warm(&self) -> bool {
        self.warm
    }

    /// Fill the cache from a listing, keeping only managed issues.
    ///
    /// When titles repeat, the lowest issue number wins.
    pub fn warm(&mut self, issues: impl IntoIterator<Item = RemoteIssue>) {
        let mut managed: Vec<RemoteIssue> =
            issues.into_iter().filter(|i| has_marker(&i.body)).collect();
        managed.sort_by_key(|i| std::cmp::Reverse(i.number));
        for issue in managed {
            self.by_title.insert(issue.title.clone(), issue);
        }
        self.warm = true;
    }

    /// Cached issue with this exact title
    pub fn get(&self, title: &str) -> Option<&RemoteIssue> {
        self.by_title.get(title)
    }

    /// Record or refresh an issue.
    pub fn insert(&mut self, issue: RemoteIssue) {
        self.by_title.insert(issue.title.clone(), issue);
    }

    /// Number of cached issues
    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}

/// Explicit state shared by the passes of a run.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    /// Content hashes of synced issues
    pub ledger: ContentLedger,
    /// Managed issues by title
    pub cache: IssueCache,
}

impl SyncState {
    /// State around an already-loaded ledger, with a cold cache.
    pub fn new(ledger: ContentLedger) -> Self {
        Self {
            ledger,
            cache: IssueCache::default(),
        }
    }
}

/// Pass in which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Finding or creating the issue
    Bind,
    /// Writing the rendered body or labels
    Render,
    /// Linking a subtask to its parent
    Link,
    /// Reconciling the `blocked` label
    Block,
}

/// One per-item failure of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Task the failure belongs to
    pub task: TaskId,
    /// Issue, if the task had one by then
    pub issue: Option<IssueNumber>,
    /// Pass that failed
    pub phase: SyncPhase,
    /// Resilience category of the error
    pub category: ErrorCategory,
    /// Error message
    pub message: String,
}

/// Counters and failures of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Tasks in the graph
    pub total: usize,
    /// Issues created
    pub created: usize,
    /// Existing issues bound
    pub found: usize,
    /// Bodies rewritten
    pub updated: usize,
    /// Bodies already correct
    pub unchanged: usize,
    /// Priority/complexity/sub-issue labels added or removed
    pub labels_reconciled: usize,
    /// Native sub-issue links
    pub linked: usize,
    /// Sub-issue links written as comments
    pub link_fallbacks: usize,
    /// `blocked` labels added
    pub blocked_added: usize,
    /// `blocked` labels removed
    pub blocked_removed: usize,
    /// Per-item failures
    pub failures: Vec<ItemFailure>,
}

impl SyncReport {
    /// Distinct tasks with at least one failure
    pub fn failed_tasks(&self) -> usize {
        self.failures
            .iter()
            .map(|f| f.task)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Whether a majority of tasks went through without failure.
    pub fn is_successful(&self) -> bool {
        let failed = self.failed_tasks();
        (self.total - failed.min(self.total)) * 2 > self.total || self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IssueState;
    use crate::render::ISSUE_MARKER;
    use rstest::rstest;

    fn issue(number: u64, title: &str, body: &str) -> RemoteIssue {
        RemoteIssue {
            id: number,
            number: IssueNumber(number),
            title: title.to_string(),
            body: body.to_string(),
            state: IssueState::Open,
            labels: vec![],
        }
    }

    #[test]
    fn test_cache_keeps_managed_issues_and_lowest_number() {
        let mut cache = IssueCache::default();
        cache.warm(vec![
            issue(5, "Schema", ISSUE_MARKER),
            issue(2, "Schema", ISSUE_MARKER),
            issue(3, "Notes", "written by hand"),
        ]);

        assert!(cache.is_warm());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("Schema").map(|i| i.number), Some(IssueNumber(2)));
        assert!(cache.get("Notes").is_none());
    }

    fn failure(task: u32) -> ItemFailure {
        ItemFailure {
            task: TaskId(task),
            issue: None,
            phase: SyncPhase::Bind,
            category: ErrorCategory::Network,
            message: "boom".to_string(),
        }
    }

    #[rstest]
    #[case::empty(0, vec![], true)]
    #[case::clean(3, vec![], true)]
    #[case::minority(3, vec![1], true)]
    #[case::same_task_twice(3, vec![1, 1], true)]
    #[case::half(4, vec![1, 2], false)]
    #[case::majority(3, vec![1, 2], false)]
    fn test_majority_success(
        #[case] total: usize,
        #[case] failed: Vec<u32>,
        #[case] expected: bool,
    ) {
        let report = SyncReport {
            total,
            failures: failed.into_iter().map(failure).collect(),
            ..SyncReport::default()
        };
        assert_eq!(report.is_successful(), expected);
    }
}
