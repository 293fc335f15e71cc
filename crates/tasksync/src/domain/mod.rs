//! Domain types for task-graph synchronization.
//!
//! Two families of types live here:
//!
//! - **Local**: [`Task`] and friends, the nodes of the computed task graph.
//! - **Remote**: [`RemoteIssue`] and friends, the tracker's view of the same work.
//!
//! The sync engine is the only place where the two meet.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum complexity score a task can carry.
pub const MAX_COMPLEXITY: u8 = 10;

/// Identifier of a task, unique within one task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl TaskId {
    /// Create a new task ID
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw integer value
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaskId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Priority of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait
    Low,

    /// Default priority
    #[default]
    Medium,

    /// Should be picked up first
    High,
}

impl Priority {
    /// Lowercase name used in labels and issue bodies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "invalid priority '{other}' (expected low, medium or high)"
            )),
        }
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started
    #[default]
    #[serde(rename = "pending")]
    Pending,

    /// Being worked on
    #[serde(rename = "in-progress", alias = "in_progress")]
    InProgress,

    /// Finished
    #[serde(rename = "completed", alias = "done")]
    Completed,

    /// Split into subtasks that carry the actual work
    #[serde(rename = "breakdown")]
    Breakdown,
}

impl TaskStatus {
    /// Name used in issue bodies (`in_progress`, not `in-progress`).
    pub const fn as_wire_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Breakdown => "breakdown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

/// Complexity bucket derived from a task's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComplexityTier {
    /// Score below 4
    Low,
    /// Score 4 to 6
    Medium,
    /// Score 7 and above
    High,
}

impl ComplexityTier {
    /// Bucket a complexity score: `>= 7` high, `>= 4` medium, else low.
    pub const fn from_score(score: u8) -> Self {
        if score >= 7 {
            Self::High
        } else if score >= 4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Lowercase name used in labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A node of the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier within the graph
    pub id: TaskId,

    /// Short title, also used as the remote issue title
    pub title: String,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Implementation details (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// How the work is verified (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<String>,

    /// Priority level
    #[serde(default)]
    pub priority: Priority,

    /// Complexity score, 0 to 10
    #[serde(default, alias = "complexityScore")]
    pub complexity: u8,

    /// Tasks that must close before this one can start, in declared order
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    /// Lifecycle status
    #[serde(default)]
    pub status: TaskStatus,

    /// Child tasks. Accepts bare ids or embedded objects carrying an `id`.
    #[serde(
        default,
        deserialize_with = "deserialize_subtask_ids",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subtasks: Vec<TaskId>,
}

impl Task {
    /// Create a pending task with default priority and no edges.
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id: TaskId(id),
            title: title.into(),
            description: String::new(),
            details: None,
            test_strategy: None,
            priority: Priority::default(),
            complexity: 0,
            dependencies: Vec::new(),
            status: TaskStatus::default(),
            subtasks: Vec::new(),
        }
    }

    /// Builder-style helper setting the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = u32>) -> Self {
        self.dependencies = deps.into_iter().map(TaskId).collect();
        self
    }

    /// Builder-style helper setting the subtask list.
    #[must_use]
    pub fn with_subtasks(mut self, subtasks: impl IntoIterator<Item = u32>) -> Self {
        self.subtasks = subtasks.into_iter().map(TaskId).collect();
        self
    }

    /// Builder-style helper setting the complexity score (clamped to 10).
    #[must_use]
    pub fn with_complexity(mut self, score: u8) -> Self {
        self.complexity = score.min(MAX_COMPLEXITY);
        self
    }

    /// Complexity tier of this task
    pub const fn complexity_tier(&self) -> ComplexityTier {
        ComplexityTier::from_score(self.complexity)
    }
}

fn deserialize_subtask_ids<'de, D>(deserializer: D) -> Result<Vec<TaskId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SubtaskRef {
        Id(u32),
        Embedded { id: u32 },
    }

    let refs = Option::<Vec<SubtaskRef>>::deserialize(deserializer)?;
    Ok(refs
        .unwrap_or_default()
        .into_iter()
        .map(|r| match r {
            SubtaskRef::Id(id) | SubtaskRef::Embedded { id } => TaskId(id),
        })
        .collect())
}

// ========== Remote side ==========

/// Tracker-assigned issue number (the `#123` users see).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueNumber(pub u64);

impl IssueNumber {
    /// Get the raw integer value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IssueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for IssueNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .trim_start_matches('#')
            .parse::<u64>()
            .map(Self)
            .map_err(|e| format!("invalid issue number '{s}': {e}"))
    }
}

/// Open/closed state of a remote issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    /// Still actionable
    Open,
    /// Resolved
    Closed,
}

impl IssueState {
    /// Whether the issue is closed
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// A remote issue as last fetched from the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIssue {
    /// Tracker-internal id (used by native sub-issue APIs)
    pub id: u64,

    /// User-facing issue number
    pub number: IssueNumber,

    /// Issue title
    pub title: String,

    /// Body text; the source of truth for rendered link sections
    pub body: String,

    /// Open or closed
    pub state: IssueState,

    /// Current label set
    pub labels: Vec<String>,
}

impl RemoteIssue {
    /// Whether the issue currently carries `label`
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Data for creating a remote issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRemoteIssue {
    /// Issue title
    pub title: String,

    /// Rendered body
    pub body: String,

    /// Labels to apply on creation
    pub labels: Vec<String>,
}

/// Which issues a list call should return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateFilter {
    /// Open issues only
    Open,
    /// Closed issues only
    Closed,
    /// Both
    #[default]
    All,
}

impl StateFilter {
    /// Query-string value understood by the tracker API.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }

    /// Whether an issue in `state` passes this filter
    pub const fn matches(self, state: IssueState) -> bool {
        match self {
            Self::All => true,
            Self::Open => matches!(state, IssueState::Open),
            Self::Closed => matches!(state, IssueState::Closed),
        }
    }
}
