//! Structural validation of task lists.
//!
//! Task lists arrive from untrusted places: the external graph generator,
//! task files and recovered artifact snapshots. All of them go through
//! [`validate_structure`] before they are deserialized, so a malformed
//! document fails with a message naming the offending task and field instead
//! of a bare serde error.
//! Generator output additionally goes through [`parse_generator_output`],
//! which applies the stricter field checks the generator contract promises.

use crate::domain::{Priority, Task, MAX_COMPLEXITY};
use crate::error::{Error, Result};
use crate::graph::TaskGraph;
use serde_json::Value;
use tracing::warn;

/// Non-fatal findings of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Human-readable warnings, in discovery order
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Whether validation found nothing worth mentioning
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, message: String) {
        warn!(%message, "Task graph validation warning");
        self.warnings.push(message);
    }
}

/// Structural check shared by fresh and recovered graphs.
///
/// `tasks` must be an array whose elements are objects with a non-empty `id`
/// and a non-empty `title`. A `complexity`, when present, must be an integer
/// from 0 to 10. An empty array is a warning, not an error.
///
/// # Errors
///
/// Returns `Error::InvalidGraph` when `tasks` is not an array and
/// `Error::InvalidTask` for the first element missing an id or title or
/// carrying an out-of-range complexity.
pub fn validate_structure(tasks: &Value) -> Result<ValidationReport> {
    let Value::Array(items) = tasks else {
        return Err(Error::InvalidGraph(format!(
            "tasks must be an array, found {}",
            json_type(tasks)
        )));
    };

    let mut report = ValidationReport::default();
    if items.is_empty() {
        report.warn("task list is empty".to_string());
    }

    for (index, item) in items.iter().enumerate() {
        let Value::Object(fields) = item else {
            return Err(Error::InvalidTask {
                index,
                field: "task",
                reason: format!("must be an object, found {}", json_type(item)),
            });
        };

        let id_present = match fields.get("id") {
            Some(Value::Number(_)) => true,
            Some(Value::String(s)) => !s.trim().is_empty(),
            _ => false,
        };
        if !id_present {
            return Err(Error::InvalidTask {
                index,
                field: "id",
                reason: "is missing or empty".to_string(),
            });
        }

        match fields.get("title") {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            _ => {
                return Err(Error::InvalidTask {
                    index,
                    field: "title",
                    reason: "is missing or empty".to_string(),
                })
            }
        }

        if let Some(score) = fields.get("complexity").or_else(|| fields.get("complexityScore")) {
            if !score.as_u64().is_some_and(|s| s <= u64::from(MAX_COMPLEXITY)) {
                return Err(Error::InvalidTask {
                    index,
                    field: "complexity",
                    reason: format!("must be an integer from 0 to {MAX_COMPLEXITY}, found {score}"),
                });
            }
        }
    }

    Ok(report)
}

/// Parse and check the JSON printed by the graph generator.
///
/// The output must be an object with a `tasks` array. Each task needs a
/// numeric `id`, a non-empty `title` and a string `description`; the
/// optional `dependencies` and `priority` fields are checked when present.
///
/// # Errors
///
/// Returns `Error::Generator` if the output is not JSON or has no `tasks`
/// array, and `Error::InvalidTask` naming the task index and field for any
/// malformed task.
pub fn parse_generator_output(output: &str) -> Result<Vec<Task>> {
    let root: Value = serde_json::from_str(output)
        .map_err(|e| Error::Generator(format!("output is not valid JSON: {e}")))?;

    let tasks = root
        .get("tasks")
        .ok_or_else(|| Error::Generator("output has no 'tasks' field".to_string()))?;

    validate_structure(tasks)?;
    let items = tasks.as_array().map(Vec::as_slice).unwrap_or_default();

    for (index, item) in items.iter().enumerate() {
        check_generated_task(index, item)?;
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<Task>(item.clone()).map_err(|e| Error::InvalidTask {
                index,
                field: "task",
                reason: e.to_string(),
            })
        })
        .collect()
}

fn check_generated_task(index: usize, task: &Value) -> Result<()> {
    let invalid = |field: &'static str, reason: String| Error::InvalidTask {
        index,
        field,
        reason,
    };

    match task.get("id") {
        Some(Value::Number(n)) if n.as_u64().is_some_and(|v| v <= u64::from(u32::MAX)) => {}
        Some(other) => {
            return Err(invalid(
                "id",
                format!("must be a non-negative integer, found {other}"),
            ))
        }
        None => return Err(invalid("id", "is missing".to_string())),
    }

    match task.get("description") {
        Some(Value::String(_)) => {}
        Some(other) => {
            return Err(invalid(
                "description",
                format!("must be a string, found {}", json_type(other)),
            ))
        }
        None => return Err(invalid("description", "is missing".to_string())),
    }

    if let Some(deps) = task.get("dependencies") {
        let Value::Array(deps) = deps else {
            return Err(invalid(
                "dependencies",
                format!("must be an array, found {}", json_type(deps)),
            ));
        };
        if let Some(bad) = deps.iter().find(|d| d.as_u64().is_none()) {
            return Err(invalid(
                "dependencies",
                format!("must contain task ids, found {bad}"),
            ));
        }
    }

    if let Some(priority) = task.get("priority") {
        let parsed = priority
            .as_str()
            .ok_or_else(|| format!("must be a string, found {}", json_type(priority)))
            .and_then(|s| s.parse::<Priority>());
        if let Err(reason) = parsed {
            return Err(invalid("priority", reason));
        }
    }

    Ok(())
}

/// Graph-level warnings: dangling references and dependency cycles.
pub fn graph_warnings(graph: &TaskGraph) -> ValidationReport {
    let mut report = ValidationReport::default();

    for task in graph.tasks() {
        for dep in &task.dependencies {
            if graph.task(*dep).is_none() {
                report.warn(format!(
                    "task {} depends on unknown task {dep}",
                    task.id
                ));
            }
        }
        for child in &task.subtasks {
            if graph.task(*child).is_none() {
                report.warn(format!("task {} lists unknown subtask {child}", task.id));
            }
        }
    }

    let cyclic = graph.cyclic_tasks();
    if !cyclic.is_empty() {
        let ids: Vec<String> = cyclic.iter().map(ToString::to_string).collect();
        report.warn(format!(
            "dependency cycle among tasks {}; their depth is pinned to 1",
            ids.join(", ")
        ));
    }

    report
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
