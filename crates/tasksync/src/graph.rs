//! Task graph model using petgraph.
//!
//! This module holds the in-memory task graph and the pure, derived views the
//! rest of the crate needs:
//!
//! - `required_by`: the reverse of the dependency edges
//! - hierarchy depth: the longest dependency chain ending at each task
//! - parent/subtask lookups
//!
//! Nothing here performs I/O.
//!
//! # Edge Direction Convention
//!
//! Edges point from **dependent -> dependency**: if task 2 depends on task 1,
//! the graph holds the edge `2 -> 1`. Outgoing edges of a node are therefore
//! its dependencies and incoming edges its dependents.
//!
//! # Cycles
//!
//! Generated graphs are supposed to be acyclic but nothing guarantees it.
//! Every task in a cyclic component (a strongly connected component with
//! more than one task, or a task depending on itself) has depth 1; depth
//! computation never recurses and terminates on any input.

use crate::domain::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Derived, per-run annotations of a task. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskAnnotations {
    /// Tasks whose dependency list contains this task, in graph order
    pub required_by: Vec<TaskId>,

    /// Longest dependency chain ending at this task (1 for roots and cycles)
    pub hierarchy_depth: usize,

    /// Task listing this one among its subtasks
    pub parent: Option<TaskId>,
}

/// Summary of complexity scores across a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexitySummary {
    /// Lowest score
    pub min: u8,
    /// Highest score
    pub max: u8,
    /// Mean score, rounded to two decimals
    pub average: f64,
}

/// The task graph of one run.
///
/// Tasks are kept in their original order in an arena; the petgraph
/// `DiGraph` holds one node per task, in the same order, so a task's arena
/// index and its `NodeIndex` coincide.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    graph: DiGraph<TaskId, ()>,
    node_map: HashMap<TaskId, NodeIndex>,
    parents: HashMap<TaskId, TaskId>,
}

impl TaskGraph {
    /// Build a graph from a task list.
    ///
    /// Dependency and subtask ids that reference tasks absent from the list
    /// are ignored (logged at debug level). Duplicate dependency ids collapse
    /// into one edge.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidGraph` if two tasks share an id.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut node_map = HashMap::with_capacity(tasks.len());

        for task in &tasks {
            let node = graph.add_node(task.id);
            if node_map.insert(task.id, node).is_some() {
                return Err(Error::InvalidGraph(format!(
                    "duplicate task id {}",
                    task.id
                )));
            }
        }

        for task in &tasks {
            let from = node_map[&task.id];
            for dep in &task.dependencies {
                match node_map.get(dep) {
                    Some(&to) => {
                        if graph.find_edge(from, to).is_none() {
                            graph.add_edge(from, to, ());
                        }
                    }
                    None => debug!(task = %task.id, dependency = %dep, "Ignoring unknown dependency"),
                }
            }
        }

        let mut parents = HashMap::new();
        for task in &tasks {
            for child in &task.subtasks {
                if !node_map.contains_key(child) {
                    debug!(task = %task.id, subtask = %child, "Ignoring unknown subtask");
                    continue;
                }
                parents.entry(*child).or_insert(task.id);
            }
        }

        Ok(Self {
            tasks,
            graph,
            node_map,
            parents,
        })
    }

    /// All tasks, in their original order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task by id
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.node_map.get(&id).map(|node| &self.tasks[node.index()])
    }

    /// Consume the graph, returning its tasks.
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    /// Dependencies of `id` that exist in this graph, in declared order.
    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        let Some(task) = self.task(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        task.dependencies
            .iter()
            .copied()
            .filter(|dep| self.node_map.contains_key(dep) && seen.insert(*dep))
            .collect()
    }

    /// Subtasks of `id` that exist in this graph, in declared order.
    pub fn subtasks_of(&self, id: TaskId) -> Vec<TaskId> {
        self.task(id)
            .map(|task| {
                task.subtasks
                    .iter()
                    .copied()
                    .filter(|child| self.node_map.contains_key(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parent of `id`, if some task lists it as a subtask.
    pub fn parent_of(&self, id: TaskId) -> Option<TaskId> {
        self.parents.get(&id).copied()
    }

    /// Every `(parent, child)` subtask edge, in graph order.
    pub fn subtask_edges(&self) -> Vec<(TaskId, TaskId)> {
        self.tasks
            .iter()
            .flat_map(|task| {
                self.subtasks_of(task.id)
                    .into_iter()
                    .map(move |child| (task.id, child))
            })
            .collect()
    }

    /// Reverse dependency index: dependency id -> dependents, in graph order.
    ///
    /// Built in a single pass over the dependency lists. Tasks nobody depends
    /// on do not appear as keys.
    pub fn required_by(&self) -> HashMap<TaskId, Vec<TaskId>> {
        let mut index: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in &self.tasks {
            for dep in self.dependencies_of(task.id) {
                index.entry(dep).or_default().push(task.id);
            }
        }
        index
    }

    /// Hierarchy depth of every task.
    ///
    /// Iterative depth-first traversal over an arena of node indices with two
    /// marks per node: `visited` (depth final) and `in_path` (on the current
    /// traversal stack). Tasks in a cyclic component are pinned to depth 1
    /// before the traversal starts and are not descended into; reaching a node
    /// that is still `in_path` also collapses to 1, so no input can recurse
    /// without bound.
    pub fn hierarchy_depths(&self) -> HashMap<TaskId, usize> {
        let n = self.graph.node_count();
        let cyclic = self.cyclic_nodes();

        let mut depth = vec![0usize; n];
        let mut visited = vec![false; n];
        let mut in_path = vec![false; n];

        for node in &cyclic {
            depth[node.index()] = 1;
            visited[node.index()] = true;
        }

        for start in self.graph.node_indices() {
            if visited[start.index()] {
                continue;
            }

            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> =
                vec![(start, self.graph.neighbors(start).collect())];
            in_path[start.index()] = true;

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                if let Some(next) = pending.pop() {
                    if !visited[next.index()] && !in_path[next.index()] {
                        in_path[next.index()] = true;
                        stack.push((next, self.graph.neighbors(next).collect()));
                    }
                    continue;
                }

                let deepest = self
                    .graph
                    .neighbors(node)
                    .map(|dep| {
                        if in_path[dep.index()] {
                            1
                        } else {
                            depth[dep.index()]
                        }
                    })
                    .max()
                    .unwrap_or(0);
                depth[node.index()] = deepest + 1;
                visited[node.index()] = true;
                in_path[node.index()] = false;
                stack.pop();
            }
        }

        self.graph
            .node_indices()
            .map(|node| (self.graph[node], depth[node.index()]))
            .collect()
    }

    /// Deepest hierarchy depth in the graph (0 for an empty graph).
    pub fn max_depth(&self) -> usize {
        self.hierarchy_depths().into_values().max().unwrap_or(0)
    }

    /// Ids of tasks that sit on a dependency cycle, in graph order.
    pub fn cyclic_tasks(&self) -> Vec<TaskId> {
        let mut nodes: Vec<NodeIndex> = self.cyclic_nodes().into_iter().collect();
        nodes.sort_unstable();
        nodes.into_iter().map(|n| self.graph[n]).collect()
    }

    fn cyclic_nodes(&self) -> HashSet<NodeIndex> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self.graph.find_edge(component[0], component[0]).is_some()
            })
            .flatten()
            .collect()
    }

    /// All derived annotations, keyed by task id.
    pub fn annotate(&self) -> HashMap<TaskId, TaskAnnotations> {
        let mut required_by = self.required_by();
        let depths = self.hierarchy_depths();

        self.tasks
            .iter()
            .map(|task| {
                let annotations = TaskAnnotations {
                    required_by: required_by.remove(&task.id).unwrap_or_default(),
                    hierarchy_depth: depths.get(&task.id).copied().unwrap_or(1),
                    parent: self.parent_of(task.id),
                };
                (task.id, annotations)
            })
            .collect()
    }

    /// Min, max and average complexity (all zero for an empty graph).
    pub fn complexity_summary(&self) -> ComplexitySummary {
        if self.tasks.is_empty() {
            return ComplexitySummary::default();
        }
        let scores = self.tasks.iter().map(|t| t.complexity);
        let min = scores.clone().min().unwrap_or(0);
        let max = scores.clone().max().unwrap_or(0);
        let total: u32 = scores.map(u32::from).sum();
        let average = f64::from(total) / self.tasks.len() as f64;
        ComplexitySummary {
            min,
            max,
            average: (average * 100.0).round() / 100.0,
        }
    }
}
