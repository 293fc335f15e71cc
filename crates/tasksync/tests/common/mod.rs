//! Shared helpers for tasksync integration tests.

#![allow(dead_code)]

use std::time::Duration;
use tasksync::domain::{RemoteIssue, Task};
use tasksync::graph::TaskGraph;
use tasksync::sync::SyncOptions;
use tasksync::tracker::{HierarchyMode, InMemoryTracker};

/// Sync options with no pause between batches.
pub fn fast_options() -> SyncOptions {
    SyncOptions {
        batch_delay: Duration::ZERO,
        hierarchy: HierarchyMode::Native,
        ..SyncOptions::default()
    }
}

/// Tasks 1 <- 2 <- 3: each depends on the previous one.
pub fn chain_graph() -> TaskGraph {
    TaskGraph::new(vec![
        Task::new(1, "Design schema").with_complexity(3),
        Task::new(2, "Build API")
            .with_dependencies([1])
            .with_complexity(5),
        Task::new(3, "Build UI")
            .with_dependencies([2])
            .with_complexity(8),
    ])
    .unwrap()
}

/// The issue titled `title`, which must exist.
pub async fn issue_titled(tracker: &InMemoryTracker, title: &str) -> RemoteIssue {
    tracker
        .issues()
        .await
        .into_iter()
        .find(|issue| issue.title == title)
        .unwrap_or_else(|| panic!("no issue titled '{title}'"))
}
