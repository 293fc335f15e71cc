//! Tracker-driven entry points.
//!
//! These run without a local task graph: the dependency structure is read
//! back from the bodies of managed issues. A full scan re-resolves every
//! open issue; the closure trigger pushes one closed issue to its
//! dependents. Both are safe to run concurrently with each other and with a
//! sync run, since a label write that is already correct is skipped.

use crate::domain::{IssueNumber, RemoteIssue, StateFilter};
use crate::error::Result;
use crate::render::has_marker;
use crate::resilience::with_retry;
use crate::resolver::{BlockedResolver, DependencyIndex, LabelTransition, PropagationReport};
use crate::sync::{for_each_batch, SyncOptions};
use crate::tracker::IssueTracker;
use serde::Serialize;
use tracing::{info, warn};

/// Counters of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Open managed issues examined
    pub scanned: usize,
    /// `blocked` labels added
    pub blocked_added: usize,
    /// `blocked` labels removed
    pub blocked_removed: usize,
    /// Issues already correct
    pub unchanged: usize,
    /// Issues whose label write failed
    pub failures: Vec<(IssueNumber, String)>,
}

/// Runs scans and closure triggers against a tracker.
pub struct Watcher<'a> {
    tracker: &'a dyn IssueTracker,
    options: SyncOptions,
}

impl<'a> Watcher<'a> {
    /// Create a watcher sharing the sync tunables.
    pub fn new(tracker: &'a dyn IssueTracker, options: SyncOptions) -> Self {
        Self { tracker, options }
    }

    fn resolver(&self) -> BlockedResolver<'a> {
        BlockedResolver::new(self.tracker, self.options.max_retries)
    }

    async fn managed_issues(&self) -> Result<(Vec<RemoteIssue>, DependencyIndex)> {
        let label = Some(self.options.label.as_str());
        let issues = with_retry("list issues", self.options.max_retries, || {
            self.tracker.list_issues(StateFilter::All, label)
        })
        .await?;
        let index = DependencyIndex::from_issues(&issues);
        Ok((issues, index))
    }

    /// Re-resolve the blocked state of every open managed issue.
    ///
    /// # Errors
    ///
    /// Returns an error only if the issue listing fails; per-issue failures
    /// are collected in the report.
    pub async fn full_scan(&self) -> Result<ScanReport> {
        let (issues, index) = self.managed_issues().await?;
        let resolver = self.resolver();

        let open: Vec<RemoteIssue> = issues
            .into_iter()
            .filter(|issue| !issue.state.is_closed() && has_marker(&issue.body))
            .collect();

        let mut report = ScanReport {
            scanned: open.len(),
            ..ScanReport::default()
        };

        let index = &index;
        for_each_batch(
            open,
            self.options.batch_size,
            self.options.batch_delay,
            |issue| async move {
                let blocked = resolver.is_blocked(index.dependencies_of(issue.number)).await;
                (issue.number, resolver.apply(&issue, blocked).await)
            },
            |(number, result)| match result {
                Ok(LabelTransition::Added) => report.blocked_added += 1,
                Ok(LabelTransition::Removed) => report.blocked_removed += 1,
                Ok(LabelTransition::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!(issue = %number, category = %e.category(), error = %e, "Scan item failed");
                    report.failures.push((number, e.to_string()));
                }
            },
        )
        .await;

        info!(
            scanned = report.scanned,
            added = report.blocked_added,
            removed = report.blocked_removed,
            failures = report.failures.len(),
            "Full scan finished"
        );
        Ok(report)
    }

    /// Propagate the closure of `closed` to the issues that depend on it.
    ///
    /// # Errors
    ///
    /// Returns an error only if the issue listing fails.
    pub async fn issue_closed(&self, closed: IssueNumber) -> Result<PropagationReport> {
        let (_, index) = self.managed_issues().await?;
        Ok(self.resolver().propagate_closure(closed, &index).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{BLOCKED_LABEL, ISSUE_MARKER};
    use crate::tracker::InMemoryTracker;
    use std::time::Duration;

    fn body(deps: &[u64]) -> String {
        let list: String = deps.iter().map(|d| format!("- [ ] #{d}\n")).collect();
        format!("## Dependencies\n{list}\n## Meta\n{ISSUE_MARKER}\n")
    }

    fn options() -> SyncOptions {
        SyncOptions {
            batch_delay: Duration::ZERO,
            ..SyncOptions::default()
        }
    }

    #[tokio::test]
    async fn test_full_scan_reconciles_labels() {
        let tracker = InMemoryTracker::new();
        let a = tracker.insert_issue("a", &body(&[]), &["taskmaster"]).await;
        let b = tracker.insert_issue("b", &body(&[1]), &["taskmaster"]).await;
        let c = tracker
            .insert_issue("c", &body(&[]), &["taskmaster", BLOCKED_LABEL])
            .await;
        tracker.insert_issue("other", &body(&[1]), &[]).await;

        let report = Watcher::new(&tracker, options()).full_scan().await.unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.blocked_added, 1);
        assert_eq!(report.blocked_removed, 1);
        assert_eq!(report.unchanged, 1);
        assert!(!tracker.issue(a.number).await.unwrap().has_label(BLOCKED_LABEL));
        assert!(tracker.issue(b.number).await.unwrap().has_label(BLOCKED_LABEL));
        assert!(!tracker.issue(c.number).await.unwrap().has_label(BLOCKED_LABEL));
    }

    #[tokio::test]
    async fn test_scan_twice_is_stable() {
        let tracker = InMemoryTracker::new();
        tracker.insert_issue("a", &body(&[]), &["taskmaster"]).await;
        tracker.insert_issue("b", &body(&[1]), &["taskmaster"]).await;
        let watcher = Watcher::new(&tracker, options());

        watcher.full_scan().await.unwrap();
        tracker.reset_calls().await;
        let second = watcher.full_scan().await.unwrap();

        assert_eq!(second.unchanged, 2);
        assert_eq!(tracker.calls().await.writes(), 0);
    }

    #[tokio::test]
    async fn test_issue_closed_unblocks_dependents() {
        let tracker = InMemoryTracker::new();
        let a = tracker.insert_issue("a", &body(&[]), &["taskmaster"]).await;
        let b = tracker
            .insert_issue("b", &body(&[1]), &["taskmaster", BLOCKED_LABEL])
            .await;
        tracker.close(a.number).await;

        let report = Watcher::new(&tracker, options())
            .issue_closed(a.number)
            .await
            .unwrap();

        assert_eq!(report.transitions, vec![(b.number, LabelTransition::Removed)]);
        assert!(!tracker.issue(b.number).await.unwrap().has_label(BLOCKED_LABEL));
    }
}
