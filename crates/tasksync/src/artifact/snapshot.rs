//! Snapshot document model and legacy normalization.
//!
//! Enhanced shape:
//!
//! ```json
//! { "master": { "tasks": [...], "metadata": { ... } },
//!   "metadata": { "prdSource": [...], "taskCount": 3, "contentChecksum": "…", ... } }
//! ```
//!
//! Legacy shapes are `{ "tasks": [...] }` and `{ "master": { "tasks": [...] } }`
//! with no metadata at either level. They are upgraded on load by deriving
//! the metadata from the task list.

use super::verify::sha256_hex;
use crate::domain::Task;
use crate::error::{Error, Result};
use crate::graph::{ComplexitySummary, TaskGraph};
use crate::validation::{validate_structure, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// How long snapshots are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// Maximum age in days
    pub max_age: u32,
    /// Maximum number of snapshots kept
    pub max_count: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: 30,
            max_count: 20,
        }
    }
}

/// Generation metadata stored next to the task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Requirement documents the graph was generated from
    #[serde(default)]
    pub prd_source: Vec<String>,
    /// Number of tasks
    pub task_count: usize,
    /// When the graph was generated
    pub generation_timestamp: DateTime<Utc>,
    /// Complexity score summary
    #[serde(default)]
    pub complexity_scores: ComplexitySummary,
    /// Longest dependency chain
    #[serde(default)]
    pub hierarchy_depth: usize,
    /// Version of the requirement documents, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prd_version: Option<String>,
    /// Version of the generator, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taskmaster_version: Option<String>,
    /// Retention policy in force when written
    #[serde(default)]
    pub retention_policy: RetentionPolicy,
    /// SHA-256 over the compact JSON of the task list, keys sorted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_checksum: Option<String>,
}

/// The `master` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSection {
    /// The task list
    pub tasks: Vec<Task>,
    /// Copy of the generation metadata kept next to the tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SnapshotMetadata>,
}

/// A stored, immutable task graph plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSnapshot {
    /// Task list
    pub master: MasterSection,
    /// Generation metadata
    pub metadata: SnapshotMetadata,
}

/// Checksum embedded in snapshot metadata.
///
/// SHA-256 over the compact JSON of the `tasks` array as a JSON value, so
/// object keys are hashed in sorted order and fields this crate does not
/// model still count.
pub fn tasks_checksum(tasks: &Value) -> String {
    sha256_hex(tasks.to_string().as_bytes())
}

impl ArtifactSnapshot {
    /// Snapshot a graph at the end of a generation run.
    ///
    /// # Errors
    ///
    /// Returns an error if the task list cannot be serialized.
    pub fn from_graph(
        graph: &TaskGraph,
        prd_source: Vec<String>,
        retention_policy: RetentionPolicy,
        generated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let tasks = graph.tasks().to_vec();
        let checksum = tasks_checksum(&serde_json::to_value(&tasks)?);
        let metadata = SnapshotMetadata {
            prd_source,
            task_count: tasks.len(),
            generation_timestamp: generated_at,
            complexity_scores: graph.complexity_summary(),
            hierarchy_depth: graph.max_depth(),
            prd_version: None,
            taskmaster_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            retention_policy,
            content_checksum: Some(checksum),
        };
        Ok(Self {
            master: MasterSection {
                tasks,
                metadata: Some(metadata.clone()),
            },
            metadata,
        })
    }

    /// Tasks of the snapshot
    pub fn tasks(&self) -> &[Task] {
        &self.master.tasks
    }
}

/// A snapshot decoded from bytes.
#[derive(Debug, Clone)]
pub struct ParsedSnapshot {
    /// Snapshot in enhanced shape
    pub snapshot: ArtifactSnapshot,
    /// Whether the input was a legacy shape
    pub legacy: bool,
    /// Structural warnings
    pub warnings: ValidationReport,
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidArtifact(reason.into())
}

/// Decode, normalize and validate snapshot bytes.
///
/// Top-level `metadata` wins over `master.metadata`; a snapshot with neither
/// is a legacy shape and gets metadata derived from its tasks. An embedded
/// content checksum is verified against the raw `tasks` JSON.
///
/// # Errors
///
/// Returns `Error::InvalidArtifact` for unparseable JSON, an unknown shape,
/// a structurally invalid task list or bad metadata, and
/// `Error::ChecksumMismatch` if the embedded checksum does not match.
pub fn parse_snapshot(bytes: &[u8]) -> Result<ParsedSnapshot> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    let Value::Object(mut root) = root else {
        return Err(invalid("snapshot must be a JSON object"));
    };

    let top_metadata = root
        .remove("metadata")
        .map(|raw| decode_metadata(raw, "metadata"))
        .transpose()?;
    let (raw_tasks, master_metadata) = take_tasks(&mut root)?;
    let master_metadata = master_metadata
        .map(|raw| decode_metadata(raw, "master.metadata"))
        .transpose()?;
    let legacy = top_metadata.is_none() && master_metadata.is_none();

    let warnings = validate_structure(&raw_tasks).map_err(|e| invalid(e.to_string()))?;
    let checksum = tasks_checksum(&raw_tasks);
    let tasks: Vec<Task> =
        serde_json::from_value(raw_tasks).map_err(|e| invalid(format!("malformed task: {e}")))?;

    let metadata = match top_metadata.or_else(|| master_metadata.clone()) {
        Some(metadata) => {
            if let Some(expected) = &metadata.content_checksum {
                if !checksum.eq_ignore_ascii_case(expected) {
                    return Err(Error::ChecksumMismatch {
                        expected: expected.clone(),
                        actual: checksum,
                    });
                }
                debug!("Embedded content checksum verified");
            }
            metadata
        }
        None => {
            info!(tasks = tasks.len(), "Upgrading legacy snapshot");
            legacy_metadata(&tasks, checksum)?
        }
    };

    Ok(ParsedSnapshot {
        snapshot: ArtifactSnapshot {
            master: MasterSection {
                tasks,
                metadata: Some(master_metadata.unwrap_or_else(|| metadata.clone())),
            },
            metadata,
        },
        legacy,
        warnings,
    })
}

fn decode_metadata(raw: Value, field: &str) -> Result<SnapshotMetadata> {
    serde_json::from_value(raw).map_err(|e| invalid(format!("malformed {field}: {e}")))
}

/// Pull the task array, and `master.metadata` if present, out of either
/// supported layout.
fn take_tasks(root: &mut Map<String, Value>) -> Result<(Value, Option<Value>)> {
    if let Some(master) = root.remove("master") {
        let Value::Object(mut master) = master else {
            return Err(invalid("'master' must be an object"));
        };
        let tasks = master
            .remove("tasks")
            .ok_or_else(|| invalid("'master' has no 'tasks' field"))?;
        return Ok((tasks, master.remove("metadata")));
    }
    let tasks = root
        .remove("tasks")
        .ok_or_else(|| invalid("snapshot has neither 'master.tasks' nor 'tasks'"))?;
    Ok((tasks, None))
}

fn legacy_metadata(tasks: &[Task], checksum: String) -> Result<SnapshotMetadata> {
    let graph = TaskGraph::new(tasks.to_vec()).map_err(|e| invalid(e.to_string()))?;
    Ok(SnapshotMetadata {
        prd_source: Vec::new(),
        task_count: tasks.len(),
        generation_timestamp: Utc::now(),
        complexity_scores: graph.complexity_summary(),
        hierarchy_depth: graph.max_depth(),
        prd_version: None,
        taskmaster_version: None,
        retention_policy: RetentionPolicy::default(),
        content_checksum: Some(checksum),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use rstest::rstest;
    use serde_json::json;

    fn sample_graph() -> TaskGraph {
        TaskGraph::new(vec![
            Task::new(1, "Schema").with_complexity(3),
            Task::new(2, "API").with_dependencies([1]).with_complexity(8),
        ])
        .unwrap()
    }

    fn snapshot_of(graph: &TaskGraph) -> ArtifactSnapshot {
        ArtifactSnapshot::from_graph(graph, vec![], RetentionPolicy::default(), Utc::now()).unwrap()
    }

    #[test]
    fn test_snapshot_metadata_from_graph() {
        let snapshot = ArtifactSnapshot::from_graph(
            &sample_graph(),
            vec!["prd.md".into()],
            RetentionPolicy::default(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(snapshot.metadata.task_count, 2);
        assert_eq!(snapshot.metadata.hierarchy_depth, 2);
        assert_eq!(snapshot.metadata.complexity_scores.max, 8);
        assert_eq!(
            snapshot.metadata.content_checksum,
            Some(tasks_checksum(&serde_json::to_value(snapshot.tasks()).unwrap()))
        );
        assert_eq!(snapshot.master.metadata.as_ref(), Some(&snapshot.metadata));
    }

    #[test]
    fn test_master_metadata_round_trips() {
        let snapshot = snapshot_of(&sample_graph());
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["master"]["metadata"]["taskCount"], json!(2));

        let parsed = parse_snapshot(value.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.snapshot.master.metadata, snapshot.master.metadata);
        assert_eq!(parsed.snapshot.metadata, snapshot.metadata);
    }

    #[test]
    fn test_master_metadata_alone_is_not_legacy() {
        let snapshot = snapshot_of(&sample_graph());
        let mut value = serde_json::to_value(&snapshot).unwrap();
        value.as_object_mut().unwrap().remove("metadata");

        let parsed = parse_snapshot(value.to_string().as_bytes()).unwrap();
        assert!(!parsed.legacy);
        assert_eq!(parsed.snapshot.metadata, snapshot.metadata);
    }

    #[test]
    fn test_checksum_covers_raw_task_json() {
        // Written by another tool: unknown fields and its own key order
        let tasks = json!([
            {"title": "Schema", "id": 1, "owner": "dana", "complexity": 3},
            {"dependencies": [1], "id": 2, "title": "API"}
        ]);
        let raw = json!({
            "master": {"tasks": tasks},
            "metadata": {
                "taskCount": 2,
                "generationTimestamp": "2026-01-05T10:00:00Z",
                "contentChecksum": tasks_checksum(&tasks),
            }
        });

        let parsed = parse_snapshot(raw.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.snapshot.tasks().len(), 2);
        assert_ne!(
            parsed.snapshot.metadata.content_checksum,
            Some(tasks_checksum(&serde_json::to_value(parsed.snapshot.tasks()).unwrap()))
        );
    }

    #[test]
    fn test_out_of_range_complexity_is_invalid() {
        let raw = json!({"master": {"tasks": [{"id": 1, "title": "a", "complexity": 42}]}});
        let err = parse_snapshot(raw.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidArtifact(ref m) if m.contains("complexity")), "got {err:?}");
    }

    #[test]
    fn test_enhanced_snapshot_parses() {
        let snapshot = snapshot_of(&sample_graph());
        let bytes = serde_json::to_vec(&snapshot).unwrap();

        let parsed = parse_snapshot(&bytes).unwrap();
        assert!(!parsed.legacy);
        assert_eq!(parsed.snapshot.tasks()[1].dependencies, vec![TaskId(1)]);
    }

    #[test]
    fn test_serialized_keys_are_camel_case() {
        let snapshot = snapshot_of(&sample_graph());
        let value = serde_json::to_value(&snapshot).unwrap();
        let metadata = &value["metadata"];
        assert!(metadata.get("taskCount").is_some());
        assert!(metadata.get("generationTimestamp").is_some());
        assert!(metadata["retentionPolicy"].get("maxAge").is_some());
        assert!(metadata.get("contentChecksum").is_some());
    }

    #[rstest]
    #[case::bare_tasks(json!({"tasks": [{"id": 1, "title": "a"}]}))]
    #[case::master_only(json!({"master": {"tasks": [{"id": 1, "title": "a"}]}}))]
    fn test_legacy_shapes_are_upgraded(#[case] raw: Value) {
        let parsed = parse_snapshot(raw.to_string().as_bytes()).unwrap();
        assert!(parsed.legacy);
        assert_eq!(parsed.snapshot.metadata.task_count, 1);
        assert!(parsed.snapshot.metadata.content_checksum.is_some());
    }

    #[test]
    fn test_tampered_tasks_fail_embedded_checksum() {
        let snapshot = snapshot_of(&sample_graph());
        let mut value = serde_json::to_value(&snapshot).unwrap();
        value["master"]["tasks"][0]["title"] = json!("Tampered");

        let err = parse_snapshot(value.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[rstest]
    #[case::not_json(b"not json".to_vec())]
    #[case::array_root(b"[]".to_vec())]
    #[case::no_tasks(br#"{"items": []}"#.to_vec())]
    #[case::tasks_not_array(br#"{"tasks": {"1": {}}}"#.to_vec())]
    #[case::missing_title(br#"{"tasks": [{"id": 1}]}"#.to_vec())]
    fn test_invalid_shapes(#[case] bytes: Vec<u8>) {
        let err = parse_snapshot(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidArtifact(_)), "got {err:?}");
    }

    #[test]
    fn test_empty_task_list_is_warning() {
        let parsed = parse_snapshot(br#"{"tasks": []}"#).unwrap();
        assert!(!parsed.warnings.is_clean());
    }
}
