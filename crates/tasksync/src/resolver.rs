//! Blocked-state resolution.
//!
//! An issue is blocked while at least one of its dependencies is open. The
//! resolver keeps the `blocked` label in line with that rule and pushes a
//! closure one hop forward to the issues that depend on the closed one.
//!
//! If any dependency cannot be fetched, the issue is treated as not blocked
//! (the label is removed or left off) and the failure is logged. The next
//! scan corrects it.

use crate::domain::{IssueNumber, RemoteIssue, TaskId};
use crate::error::Result;
use crate::graph::TaskGraph;
use crate::render::{has_marker, parse_dependency_numbers, BLOCKED_LABEL};
use crate::resilience::with_retry;
use crate::tracker::IssueTracker;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Issue-level dependency edges in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyIndex {
    dependencies: HashMap<IssueNumber, Vec<IssueNumber>>,
    dependents: HashMap<IssueNumber, Vec<IssueNumber>>,
}

impl DependencyIndex {
    /// Build the index from a task graph and the issues bound to its tasks.
    ///
    /// Tasks without a bound issue are skipped, as are dependencies whose
    /// task has none.
    pub fn from_graph(graph: &TaskGraph, bindings: &HashMap<TaskId, RemoteIssue>) -> Self {
        let mut index = Self::default();
        for task in graph.tasks() {
            let Some(issue) = bindings.get(&task.id) else {
                continue;
            };
            let deps = graph
                .dependencies_of(task.id)
                .into_iter()
                .filter_map(|dep| bindings.get(&dep).map(|b| b.number))
                .collect();
            index.insert(issue.number, deps);
        }
        index
    }

    /// Build the index from issue bodies alone.
    ///
    /// Only issues carrying the tasksync marker contribute; their
    /// `## Dependencies` section is parsed for issue references.
    pub fn from_issues(issues: &[RemoteIssue]) -> Self {
        let mut index = Self::default();
        for issue in issues.iter().filter(|i| has_marker(&i.body)) {
            index.insert(issue.number, parse_dependency_numbers(&issue.body));
        }
        index
    }

    fn insert(&mut self, number: IssueNumber, deps: Vec<IssueNumber>) {
        for dep in &deps {
            let dependents = self.dependents.entry(*dep).or_default();
            if !dependents.contains(&number) {
                dependents.push(number);
            }
        }
        self.dependencies.insert(number, deps);
    }

    /// Issues `number` depends on, in declared order
    pub fn dependencies_of(&self, number: IssueNumber) -> &[IssueNumber] {
        self.dependencies.get(&number).map_or(&[], Vec::as_slice)
    }

    /// Issues whose dependency list contains `number`
    pub fn dependents_of(&self, number: IssueNumber) -> &[IssueNumber] {
        self.dependents.get(&number).map_or(&[], Vec::as_slice)
    }

    /// Number of indexed issues
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Outcome of reconciling one issue's `blocked` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelTransition {
    /// The label was added
    Added,
    /// The label was removed
    Removed,
    /// The label already matched
    Unchanged,
}

/// Result of pushing one closure to its dependents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PropagationReport {
    /// The closed issue
    pub closed: Option<IssueNumber>,
    /// Dependents that were re-resolved
    pub transitions: Vec<(IssueNumber, LabelTransition)>,
    /// Dependents whose label write failed
    pub failures: Vec<(IssueNumber, String)>,
}

/// Computes and applies blocked state against a tracker.
#[derive(Clone, Copy)]
pub struct BlockedResolver<'a> {
    tracker: &'a dyn IssueTracker,
    max_retries: u32,
}

impl<'a> BlockedResolver<'a> {
    /// Create a resolver whose remote calls retry up to `max_retries` times.
    pub fn new(tracker: &'a dyn IssueTracker, max_retries: u32) -> Self {
        Self {
            tracker,
            max_retries,
        }
    }

    /// Whether any dependency is open.
    ///
    /// Dependencies are fetched in order and the first open one ends the
    /// walk. A fetch that still fails after retries makes the answer
    /// `false`.
    pub async fn is_blocked(&self, dependencies: &[IssueNumber]) -> bool {
        for &dep in dependencies {
            let fetched = with_retry("get dependency", self.max_retries, || {
                self.tracker.get_issue(dep)
            })
            .await;
            match fetched {
                Ok(issue) if !issue.state.is_closed() => {
                    debug!(dependency = %dep, "Open dependency found");
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        dependency = %dep,
                        category = %e.category(),
                        error = %e,
                        "Could not fetch dependency, treating issue as not blocked"
                    );
                    return false;
                }
            }
        }
        false
    }

    /// Bring the `blocked` label of `issue` in line with `blocked`.
    ///
    /// # Errors
    ///
    /// Returns the label write error once retries are exhausted.
    pub async fn apply(&self, issue: &RemoteIssue, blocked: bool) -> Result<LabelTransition> {
        let labeled = issue.has_label(BLOCKED_LABEL);
        let number = issue.number;

        let transition = match (blocked, labeled) {
            (true, false) => {
                with_retry("add blocked label", self.max_retries, || {
                    self.tracker.add_label(number, BLOCKED_LABEL)
                })
                .await?;
                LabelTransition::Added
            }
            (false, true) => {
                with_retry("remove blocked label", self.max_retries, || {
                    self.tracker.remove_label(number, BLOCKED_LABEL)
                })
                .await?;
                LabelTransition::Removed
            }
            _ => LabelTransition::Unchanged,
        };

        match transition {
            LabelTransition::Added => info!(issue = %number, "Marked issue as blocked"),
            LabelTransition::Removed => info!(issue = %number, "Issue unblocked"),
            LabelTransition::Unchanged => debug!(issue = %number, blocked, "Blocked label already correct"),
        }
        Ok(transition)
    }

    /// Fetch an issue and reconcile its label from the index.
    ///
    /// Closed issues are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue itself cannot be fetched or the label
    /// write fails.
    pub async fn resolve(
        &self,
        number: IssueNumber,
        index: &DependencyIndex,
    ) -> Result<LabelTransition> {
        let issue = with_retry("get issue", self.max_retries, || {
            self.tracker.get_issue(number)
        })
        .await?;
        if issue.state.is_closed() {
            debug!(issue = %number, "Skipping closed issue");
            return Ok(LabelTransition::Unchanged);
        }

        let blocked = self.is_blocked(index.dependencies_of(number)).await;
        self.apply(&issue, blocked).await
    }

    /// Re-resolve every dependent of a closed issue (one hop).
    pub async fn propagate_closure(
        &self,
        closed: IssueNumber,
        index: &DependencyIndex,
    ) -> PropagationReport {
        let mut report = PropagationReport {
            closed: Some(closed),
            ..PropagationReport::default()
        };

        for &dependent in index.dependents_of(closed) {
            match self.resolve(dependent, index).await {
                Ok(transition) => report.transitions.push((dependent, transition)),
                Err(e) => {
                    warn!(
                        issue = %dependent,
                        closed = %closed,
                        category = %e.category(),
                        error = %e,
                        "Failed to propagate closure"
                    );
                    report.failures.push((dependent, e.to_string()));
                }
            }
        }

        info!(
            closed = %closed,
            dependents = report.transitions.len() + report.failures.len(),
            "Propagated closure"
        );
        report
    }
}
