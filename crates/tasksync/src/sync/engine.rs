use super::batch::for_each_batch;
use super::{ItemFailure, SyncOptions, SyncPhase, SyncReport, SyncState};
use crate::domain::{IssueNumber, NewRemoteIssue, RemoteIssue, StateFilter, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::graph::{TaskAnnotations, TaskGraph};
use crate::render::{
    render_body, sub_issue_comment, task_labels, BodyLinks, IssueLink, BLOCKED_LABEL,
    SUB_ISSUE_LABEL,
};
use crate::resilience::with_retry;
use crate::resolver::{BlockedResolver, DependencyIndex, LabelTransition};
use crate::tracker::{HierarchyMode, IssueTracker};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Result of a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Counters and per-item failures
    pub report: SyncReport,
    /// Issue bound to each task, as last seen
    pub bindings: HashMap<TaskId, RemoteIssue>,
}

impl SyncOutcome {
    /// Issue-level dependency index of the synced graph.
    pub fn dependency_index(&self, graph: &TaskGraph) -> DependencyIndex {
        DependencyIndex::from_graph(graph, &self.bindings)
    }
}

/// Pushes task graphs to a tracker.
pub struct SyncEngine<'a> {
    tracker: &'a dyn IssueTracker,
    options: SyncOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Created,
    Found,
}

#[derive(Debug)]
struct BindItem {
    task: TaskId,
    title: String,
    body: String,
    labels: Vec<String>,
    recheck: bool,
}

#[derive(Debug)]
struct RenderItem {
    task: TaskId,
    number: IssueNumber,
    title: String,
    body: Option<String>,
    add_labels: Vec<String>,
    remove_labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Native,
    Comment,
}

/// Per-run scratch data shared by the passes.
struct Run<'g> {
    graph: &'g TaskGraph,
    annotations: HashMap<TaskId, TaskAnnotations>,
    bindings: HashMap<TaskId, RemoteIssue>,
    created: HashSet<TaskId>,
    report: SyncReport,
}

impl Run<'_> {
    fn fail(&mut self, task: TaskId, phase: SyncPhase, error: &Error) {
        let issue = self.bindings.get(&task).map(|b| b.number);
        let category = error.category();
        warn!(task = %task, ?phase, %category, error = %error, "Sync item failed");
        self.report.failures.push(ItemFailure {
            task,
            issue,
            phase,
            category,
            message: error.to_string(),
        });
    }

    fn link(&self, id: TaskId) -> Option<IssueLink> {
        self.bindings.get(&id).map(|issue| IssueLink {
            number: issue.number,
            closed: issue.state.is_closed(),
        })
    }

    fn links_for(&self, id: TaskId) -> BodyLinks {
        let annotations = self.annotations.get(&id);
        BodyLinks {
            dependencies: self
                .graph
                .dependencies_of(id)
                .into_iter()
                .filter_map(|dep| self.link(dep))
                .collect(),
            required_by: annotations
                .map(|a| a.required_by.iter().filter_map(|r| self.link(*r)).collect())
                .unwrap_or_default(),
            subtasks: self
                .graph
                .subtasks_of(id)
                .into_iter()
                .filter_map(|child| self.link(child))
                .collect(),
        }
    }

    fn is_breakdown_child(&self, id: TaskId) -> bool {
        self.graph
            .parent_of(id)
            .and_then(|parent| self.graph.task(parent))
            .is_some_and(|parent| parent.status == TaskStatus::Breakdown)
    }
}

impl<'a> SyncEngine<'a> {
    /// Create an engine over `tracker`.
    pub fn new(tracker: &'a dyn IssueTracker, options: SyncOptions) -> Self {
        Self { tracker, options }
    }

    /// A resolver sharing this engine's tracker and retry ceiling.
    pub fn resolver(&self) -> BlockedResolver<'a> {
        BlockedResolver::new(self.tracker, self.options.max_retries)
    }

    /// Synchronize `graph` to the tracker.
    ///
    /// Per-item failures are recorded in the report and do not stop the
    /// run. The ledger is flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial issue listing fails after retries or
    /// the ledger cannot be written.
    pub async fn sync(&self, graph: &TaskGraph, state: &mut SyncState) -> Result<SyncOutcome> {
        info!(tasks = graph.len(), mode = %self.options.hierarchy, "Starting sync");

        if !state.cache.is_warm() {
            let label = Some(self.options.label.as_str());
            let issues = with_retry("list issues", self.options.max_retries, || {
                self.tracker.list_issues(StateFilter::All, label)
            })
            .await?;
            state.cache.warm(issues);
            debug!(cached = state.cache.len(), "Warmed issue cache");
        }

        let mut run = Run {
            graph,
            annotations: graph.annotate(),
            bindings: HashMap::new(),
            created: HashSet::new(),
            report: SyncReport {
                total: graph.len(),
                ..SyncReport::default()
            },
        };

        self.bind_pass(&mut run, state).await;
        self.render_pass(&mut run, state).await;
        self.link_pass(&mut run).await;
        self.block_pass(&mut run, state).await;

        state.ledger.flush().await?;

        let report = &run.report;
        info!(
            created = report.created,
            found = report.found,
            updated = report.updated,
            unchanged = report.unchanged,
            linked = report.linked + report.link_fallbacks,
            failures = report.failures.len(),
            "Sync finished"
        );

        Ok(SyncOutcome {
            report: run.report,
            bindings: run.bindings,
        })
    }

    async fn bind_pass(&self, run: &mut Run<'_>, state: &mut SyncState) {
        let graph = run.graph;
        let mut pending = Vec::new();
        let mut seen_titles = HashSet::new();

        for task in graph.tasks() {
            if !seen_titles.insert(task.title.as_str()) {
                let err = Error::InvalidGraph(format!("duplicate task title '{}'", task.title));
                run.fail(task.id, SyncPhase::Bind, &err);
                continue;
            }

            if let Some(issue) = state.cache.get(&task.title) {
                debug!(task = %task.id, issue = %issue.number, "Bound to cached issue");
                run.bindings.insert(task.id, issue.clone());
                run.report.found += 1;
                continue;
            }

            let annotations = run.annotations.get(&task.id).cloned().unwrap_or_default();
            pending.push(BindItem {
                task: task.id,
                title: task.title.clone(),
                body: render_body(task, &annotations, &BodyLinks::default()),
                labels: task_labels(task, &self.options.label, run.is_breakdown_child(task.id)),
                recheck: state.ledger.contains(&task.title),
            });
        }

        for_each_batch(
            pending,
            self.options.batch_size,
            self.options.batch_delay,
            |item| self.find_or_create(item),
            |(item, result)| match result {
                Ok((issue, bound)) => {
                    if bound == Bound::Created {
                        state.ledger.record(&item.title, &item.body);
                        run.created.insert(item.task);
                        run.report.created += 1;
                    } else {
                        run.report.found += 1;
                    }
                    state.cache.insert(issue.clone());
                    run.bindings.insert(item.task, issue);
                }
                Err(e) => run.fail(item.task, SyncPhase::Bind, &e),
            },
        )
        .await;
    }

    async fn find_or_create(&self, item: BindItem) -> (BindItem, Result<(RemoteIssue, Bound)>) {
        let result = self.try_find_or_create(&item).await;
        (item, result)
    }

    async fn try_find_or_create(&self, item: &BindItem) -> Result<(RemoteIssue, Bound)> {
        let retries = self.options.max_retries;

        if item.recheck {
            let label = Some(self.options.label.as_str());
            let found = with_retry("find issue", retries, || {
                self.tracker.find_by_title(&item.title, label)
            })
            .await?;
            if let Some(issue) = found {
                info!(task = %item.task, issue = %issue.number, "Found issue missed by cache");
                return Ok((issue, Bound::Found));
            }
        }

        let new_issue = NewRemoteIssue {
            title: item.title.clone(),
            body: item.body.clone(),
            labels: item.labels.clone(),
        };
        let issue = with_retry("create issue", retries, || {
            self.tracker.create_issue(new_issue.clone())
        })
        .await?;
        info!(task = %item.task, issue = %issue.number, "Created issue");
        Ok((issue, Bound::Created))
    }

    async fn render_pass(&self, run: &mut Run<'_>, state: &mut SyncState) {
        let graph = run.graph;
        let mut pending = Vec::new();

        for task in graph.tasks() {
            let Some(issue) = run.bindings.get(&task.id) else {
                continue;
            };
            let annotations = run.annotations.get(&task.id).cloned().unwrap_or_default();
            let body = render_body(task, &annotations, &run.links_for(task.id));

            let wanted = task_labels(task, &self.options.label, run.is_breakdown_child(task.id));
            let add_labels: Vec<String> = wanted
                .iter()
                .filter(|l| !issue.has_label(l))
                .cloned()
                .collect();
            let remove_labels: Vec<String> = issue
                .labels
                .iter()
                .filter(|l| is_managed_label(l) && !wanted.contains(l))
                .cloned()
                .collect();

            let body_changed = body != issue.body;
            let hash_matches = state.ledger.is_unchanged(&task.title, &body);
            if !body_changed {
                if hash_matches {
                    debug!(task = %task.id, issue = %issue.number, "Issue body unchanged");
                } else {
                    debug!(
                        task = %task.id,
                        issue = %issue.number,
                        "Issue body unchanged, recording content hash"
                    );
                    state.ledger.record(&task.title, &body);
                }
                run.report.unchanged += 1;
            } else if hash_matches {
                info!(
                    task = %task.id,
                    issue = %issue.number,
                    "Issue body edited outside tasksync, restoring"
                );
            }
            if body_changed || !add_labels.is_empty() || !remove_labels.is_empty() {
                pending.push(RenderItem {
                    task: task.id,
                    number: issue.number,
                    title: task.title.clone(),
                    body: body_changed.then_some(body),
                    add_labels,
                    remove_labels,
                });
            }
        }

        for_each_batch(
            pending,
            self.options.batch_size,
            self.options.batch_delay,
            |item| self.push_render(item),
            |(item, result)| match result {
                Ok(()) => {
                    if let Some(issue) = run.bindings.get_mut(&item.task) {
                        if let Some(body) = &item.body {
                            issue.body.clone_from(body);
                        }
                        issue.labels.retain(|l| !item.remove_labels.contains(l));
                        issue.labels.extend(item.add_labels.iter().cloned());
                        state.cache.insert(issue.clone());
                    }
                    if let Some(body) = &item.body {
                        state.ledger.record(&item.title, body);
                        run.report.updated += 1;
                    }
                    run.report.labels_reconciled += item.add_labels.len() + item.remove_labels.len();
                }
                Err(e) => run.fail(item.task, SyncPhase::Render, &e),
            },
        )
        .await;
    }

    async fn push_render(&self, item: RenderItem) -> (RenderItem, Result<()>) {
        let result = self.try_push_render(&item).await;
        (item, result)
    }

    async fn try_push_render(&self, item: &RenderItem) -> Result<()> {
        let retries = self.options.max_retries;
        let number = item.number;

        if let Some(body) = &item.body {
            with_retry("update issue", retries, || {
                self.tracker.update_issue_body(number, body)
            })
            .await?;
            info!(task = %item.task, issue = %number, "Updated issue body");
        }
        for label in &item.add_labels {
            with_retry("add label", retries, || self.tracker.add_label(number, label)).await?;
        }
        for label in &item.remove_labels {
            with_retry("remove label", retries, || {
                self.tracker.remove_label(number, label)
            })
            .await?;
        }
        Ok(())
    }

    /// Link every subtask edge the tracker does not already hold.
    ///
    /// Edges touching an issue created in this run are linked directly.
    /// For the rest, the parent's existing children are read back so that a
    /// link which failed in an earlier run is retried.
    async fn link_pass(&self, run: &mut Run<'_>) {
        let edges: Vec<(TaskId, TaskId)> = run
            .graph
            .subtask_edges()
            .into_iter()
            .filter(|(parent, child)| {
                run.bindings.contains_key(parent) && run.bindings.contains_key(child)
            })
            .collect();

        let mut parents: Vec<(TaskId, IssueNumber)> = edges
            .iter()
            .filter(|(parent, child)| !run.created.contains(parent) && !run.created.contains(child))
            .filter_map(|(parent, _)| run.bindings.get(parent).map(|issue| (*parent, issue.number)))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        parents.sort_by_key(|(_, number)| *number);

        let retries = self.options.max_retries;
        let mut existing: HashMap<TaskId, HashSet<IssueNumber>> = HashMap::new();
        for_each_batch(
            parents,
            self.options.batch_size,
            self.options.batch_delay,
            |(parent, number)| async move {
                let result = with_retry("list linked children", retries, || {
                    self.tracker.linked_children(number)
                })
                .await;
                (parent, result)
            },
            |(parent, result)| match result {
                Ok(children) => {
                    existing.insert(parent, children.into_iter().collect());
                }
                Err(e) => run.fail(parent, SyncPhase::Link, &e),
            },
        )
        .await;

        let pending: Vec<(TaskId, IssueNumber, RemoteIssue)> = edges
            .into_iter()
            .filter_map(|(parent, child)| {
                let parent_issue = run.bindings.get(&parent)?;
                let child_issue = run.bindings.get(&child)?;
                let is_new = run.created.contains(&parent) || run.created.contains(&child);
                let missing = existing
                    .get(&parent)
                    .is_some_and(|children| !children.contains(&child_issue.number));
                (is_new || missing).then(|| (child, parent_issue.number, child_issue.clone()))
            })
            .collect();
        debug!(edges = pending.len(), "Sub-issue links to write");

        for_each_batch(
            pending,
            self.options.batch_size,
            self.options.batch_delay,
            |(child, parent, child_issue)| async move {
                (child, self.link_sub_issue(parent, &child_issue).await)
            },
            |(child, result)| match result {
                Ok(LinkKind::Native) => run.report.linked += 1,
                Ok(LinkKind::Comment) => run.report.link_fallbacks += 1,
                Err(e) => run.fail(child, SyncPhase::Link, &e),
            },
        )
        .await;
    }

    async fn link_sub_issue(&self, parent: IssueNumber, child: &RemoteIssue) -> Result<LinkKind> {
        let retries = self.options.max_retries;

        if self.options.hierarchy == HierarchyMode::Native {
            match with_retry("add sub-issue", retries, || {
                self.tracker.add_sub_issue(parent, child)
            })
            .await
            {
                Ok(()) => {
                    debug!(parent = %parent, child = %child.number, "Linked sub-issue");
                    return Ok(LinkKind::Native);
                }
                Err(e) => warn!(
                    parent = %parent,
                    child = %child.number,
                    error = %e,
                    "Native sub-issue link failed, falling back to comment"
                ),
            }
        }

        let comment = sub_issue_comment(child.number);
        with_retry("post sub-issue comment", retries, || {
            self.tracker.create_comment(parent, &comment)
        })
        .await?;
        debug!(parent = %parent, child = %child.number, "Linked sub-issue by comment");
        Ok(LinkKind::Comment)
    }

    async fn block_pass(&self, run: &mut Run<'_>, state: &mut SyncState) {
        let index = DependencyIndex::from_graph(run.graph, &run.bindings);
        let resolver = self.resolver();

        let pending: Vec<(TaskId, RemoteIssue, Vec<IssueNumber>)> = run
            .graph
            .tasks()
            .iter()
            .filter_map(|task| {
                let issue = run.bindings.get(&task.id)?;
                (!issue.state.is_closed()).then(|| {
                    let deps = index.dependencies_of(issue.number).to_vec();
                    (task.id, issue.clone(), deps)
                })
            })
            .collect();

        for_each_batch(
            pending,
            self.options.batch_size,
            self.options.batch_delay,
            |(task, issue, deps)| async move {
                let blocked = resolver.is_blocked(&deps).await;
                (task, resolver.apply(&issue, blocked).await)
            },
            |(task, result)| match result {
                Ok(transition) => {
                    let labels = run.bindings.get_mut(&task).map(|issue| &mut issue.labels);
                    match transition {
                        LabelTransition::Added => {
                            run.report.blocked_added += 1;
                            if let Some(labels) = labels {
                                labels.push(BLOCKED_LABEL.to_string());
                            }
                        }
                        LabelTransition::Removed => {
                            run.report.blocked_removed += 1;
                            if let Some(labels) = labels {
                                labels.retain(|l| l != BLOCKED_LABEL);
                            }
                        }
                        LabelTransition::Unchanged => {}
                    }
                    if let Some(issue) = run.bindings.get(&task) {
                        state.cache.insert(issue.clone());
                    }
                }
                Err(e) => run.fail(task, SyncPhase::Block, &e),
            },
        )
        .await;
    }
}

/// Labels derived from task fields, which the render pass may remove.
fn is_managed_label(label: &str) -> bool {
    label.starts_with("priority:") || label.starts_with("complexity:") || label == SUB_ISSUE_LABEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use crate::error::TrackerError;
    use crate::tracker::InMemoryTracker;
    use std::time::Duration;

    fn options(hierarchy: HierarchyMode) -> SyncOptions {
        SyncOptions {
            batch_delay: Duration::ZERO,
            hierarchy,
            ..SyncOptions::default()
        }
    }

    fn chain() -> TaskGraph {
        TaskGraph::new(vec![
            Task::new(1, "Schema"),
            Task::new(2, "API").with_dependencies([1]),
            Task::new(3, "UI").with_dependencies([2]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_run_creates_renders_and_blocks() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let mut state = SyncState::default();

        let outcome = engine.sync(&chain(), &mut state).await.unwrap();
        let report = &outcome.report;

        assert_eq!(report.created, 3);
        assert_eq!(report.updated, 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.blocked_added, 2);

        let api = tracker.issue(outcome.bindings[&TaskId(2)].number).await.unwrap();
        assert!(api.body.contains("## Dependencies\n- [ ] #1\n"));
        assert!(api.body.contains("- Required By:\n   - [ ] #3\n"));
        assert!(api.has_label(BLOCKED_LABEL));
        assert!(api.has_label("taskmaster"));
        assert!(!tracker.issue(IssueNumber(1)).await.unwrap().has_label(BLOCKED_LABEL));
    }

    #[tokio::test]
    async fn test_second_run_makes_no_writes() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let graph = chain();

        engine.sync(&graph, &mut SyncState::default()).await.unwrap();
        tracker.reset_calls().await;

        let outcome = engine.sync(&graph, &mut SyncState::default()).await.unwrap();
        assert_eq!(outcome.report.found, 3);
        assert_eq!(outcome.report.unchanged, 3);
        assert_eq!(tracker.calls().await.writes(), 0);
    }

    #[tokio::test]
    async fn test_reused_state_makes_no_writes() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let graph = chain();
        let mut state = SyncState::default();

        engine.sync(&graph, &mut state).await.unwrap();
        tracker.reset_calls().await;

        let outcome = engine.sync(&graph, &mut state).await.unwrap();
        assert_eq!(outcome.report.blocked_added, 0);
        assert_eq!(tracker.calls().await.writes(), 0);
        assert_eq!(tracker.calls().await.list, 0);
    }

    #[tokio::test]
    async fn test_body_edited_in_tracker_is_restored() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let graph = chain();
        let mut state = SyncState::default();
        engine.sync(&graph, &mut state).await.unwrap();

        let edited = format!("edited by hand\n{}", crate::render::ISSUE_MARKER);
        tracker.update_issue_body(IssueNumber(1), &edited).await.unwrap();

        let mut fresh = SyncState::new(state.ledger.clone());
        let outcome = engine.sync(&graph, &mut fresh).await.unwrap();

        assert_eq!(outcome.report.updated, 1);
        assert_eq!(outcome.report.unchanged, 2);
        let restored = tracker.issue(IssueNumber(1)).await.unwrap();
        assert!(restored.body.starts_with("---\nid: 1\n"));
    }

    #[tokio::test]
    async fn test_duplicate_titles_fail_the_later_task() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let graph = TaskGraph::new(vec![Task::new(1, "Same"), Task::new(2, "Same")]).unwrap();

        let outcome = engine.sync(&graph, &mut SyncState::default()).await.unwrap();
        assert_eq!(outcome.report.created, 1);
        assert_eq!(outcome.report.failures.len(), 1);
        assert_eq!(outcome.report.failures[0].task, TaskId(2));
    }

    #[tokio::test]
    async fn test_ledger_entry_triggers_uncached_lookup() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let graph = TaskGraph::new(vec![Task::new(1, "Schema")]).unwrap();

        let mut state = SyncState::default();
        engine.sync(&graph, &mut state).await.unwrap();

        // Warm cache that predates the issue: lookup must go to the tracker
        let mut stale = SyncState::new(state.ledger.clone());
        stale.cache.warm(Vec::new());
        let outcome = engine.sync(&graph, &mut stale).await.unwrap();

        assert_eq!(outcome.report.created, 0);
        assert_eq!(outcome.report.found, 1);
        assert_eq!(tracker.issues().await.len(), 1);
    }

    #[tokio::test]
    async fn test_subtasks_linked_natively() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let graph = TaskGraph::new(vec![
            Task::new(1, "Epic").with_subtasks([2]),
            Task::new(2, "Child"),
        ])
        .unwrap();

        let outcome = engine.sync(&graph, &mut SyncState::default()).await.unwrap();
        assert_eq!(outcome.report.linked, 1);
        assert_eq!(
            tracker.sub_issue_links().await,
            vec![(IssueNumber(1), IssueNumber(2))]
        );

        let parent = tracker.issue(IssueNumber(1)).await.unwrap();
        assert!(parent.body.contains("## Subtasks\n- [ ] #2\n"));
    }

    #[tokio::test]
    async fn test_native_link_failure_falls_back_to_comment() {
        let tracker = InMemoryTracker::new();
        tracker
            .fail_sub_issues(TrackerError::status(422, "sub-issue limit reached"))
            .await;
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let graph = TaskGraph::new(vec![
            Task::new(1, "Epic").with_subtasks([2]),
            Task::new(2, "Child"),
        ])
        .unwrap();

        let outcome = engine.sync(&graph, &mut SyncState::default()).await.unwrap();
        assert_eq!(outcome.report.link_fallbacks, 1);
        assert!(outcome.report.failures.is_empty());
        assert_eq!(tracker.comments(IssueNumber(1)).await, vec!["Sub-issue: #2"]);
    }

    #[tokio::test]
    async fn test_breakdown_children_get_sub_issue_label() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::CommentFallback));
        let mut epic = Task::new(1, "Epic").with_subtasks([2]);
        epic.status = TaskStatus::Breakdown;
        let graph = TaskGraph::new(vec![epic, Task::new(2, "Child")]).unwrap();

        engine.sync(&graph, &mut SyncState::default()).await.unwrap();
        let child = tracker.issue(IssueNumber(2)).await.unwrap();
        assert!(child.has_label(SUB_ISSUE_LABEL));
    }

    #[tokio::test]
    async fn test_stale_priority_label_is_replaced() {
        let tracker = InMemoryTracker::new();
        let engine = SyncEngine::new(&tracker, options(HierarchyMode::Native));
        let mut task = Task::new(1, "Schema");
        engine
            .sync(&TaskGraph::new(vec![task.clone()]).unwrap(), &mut SyncState::default())
            .await
            .unwrap();

        task.priority = crate::domain::Priority::High;
        let outcome = engine
            .sync(&TaskGraph::new(vec![task]).unwrap(), &mut SyncState::default())
            .await
            .unwrap();

        let issue = tracker.issue(IssueNumber(1)).await.unwrap();
        assert!(issue.has_label("priority:high"));
        assert!(!issue.has_label("priority:medium"));
        assert_eq!(outcome.report.updated, 1);
        assert_eq!(outcome.report.labels_reconciled, 2);
    }
}
