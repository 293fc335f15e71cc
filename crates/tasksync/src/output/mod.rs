//! Output formatting for CLI commands.
//!
//! Every report type prints either as human-readable text or, with `--json`,
//! as pretty JSON. Text printers take a writer so they can be tested
//! without touching stdout.

pub mod color;

use crate::artifact::{RecoveredGraph, StoredArtifact};
use crate::graph::{ComplexitySummary, TaskGraph};
use crate::resolver::{LabelTransition, PropagationReport};
use crate::sync::SyncReport;
use crate::validation::ValidationReport;
use crate::watcher::ScanReport;
use serde::Serialize;
use std::env;
use std::io::{self, Write};

use color::{count, error, header, info, muted, success, warning};

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// Configuration for text output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create an OutputConfig with explicit values.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Create an OutputConfig by reading from environment variables.
    ///
    /// Reads:
    /// - `NO_COLOR`: Standard env var to disable colors (any value disables colors)
    /// - `TASKSYNC_COLOR`: Set to "0" or "false" to disable colors (default: true)
    pub fn from_env() -> Self {
        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("TASKSYNC_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);
        Self { use_colors }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { use_colors: true }
    }
}

/// Shape summary of a task graph, printed by `validate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    /// Number of tasks
    pub tasks: usize,
    /// Longest dependency chain
    pub max_depth: usize,
    /// Complexity score summary
    pub complexity: ComplexitySummary,
    /// Tasks caught in dependency cycles
    pub cyclic_tasks: Vec<u32>,
    /// Validation warnings
    pub warnings: Vec<String>,
}

impl GraphSummary {
    /// Summarize `graph` together with the warnings gathered for it.
    pub fn new(graph: &TaskGraph, warnings: &ValidationReport) -> Self {
        Self {
            tasks: graph.len(),
            max_depth: graph.max_depth(),
            complexity: graph.complexity_summary(),
            cyclic_tasks: graph.cyclic_tasks().into_iter().map(|id| id.0).collect(),
            warnings: warnings.warnings.clone(),
        }
    }
}

/// Summary of a recovery, printed by `recover`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoverySummary {
    /// Where the snapshot came from
    pub location: String,
    /// SHA-256 of the fetched bytes
    pub checksum: String,
    /// Whether the snapshot was in a legacy shape
    pub legacy: bool,
    /// Shape of the recovered graph
    pub graph: GraphSummary,
}

impl RecoverySummary {
    /// Summarize a recovered graph.
    pub fn new(location: impl Into<String>, recovered: &RecoveredGraph) -> Self {
        Self {
            location: location.into(),
            checksum: recovered.checksum.clone(),
            legacy: recovered.legacy,
            graph: GraphSummary::new(&recovered.graph, &recovered.warnings),
        }
    }
}

// ============================================================================
// Public Dispatch Functions
// ============================================================================

/// Print a sync report in the specified format
pub fn print_sync_report(
    report: &SyncReport,
    artifact: Option<&StoredArtifact>,
    mode: OutputMode,
) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => {
            write_sync_report(&mut handle, report, &OutputConfig::from_env())?;
            if let Some(artifact) = artifact {
                write_artifact(&mut handle, artifact, &OutputConfig::from_env())?;
            }
            Ok(())
        }
        OutputMode::Json => write_json(
            &mut handle,
            &serde_json::json!({ "report": report, "artifact": artifact.map(artifact_json) }),
        ),
    }
}

/// Print a full scan report in the specified format
pub fn print_scan_report(report: &ScanReport, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => write_scan_report(&mut handle, report, &OutputConfig::from_env()),
        OutputMode::Json => write_json(&mut handle, report),
    }
}

/// Print a closure propagation report in the specified format
pub fn print_propagation_report(report: &PropagationReport, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => {
            write_propagation_report(&mut handle, report, &OutputConfig::from_env())
        }
        OutputMode::Json => write_json(&mut handle, report),
    }
}

/// Print a graph summary in the specified format
pub fn print_graph_summary(summary: &GraphSummary, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => write_graph_summary(&mut handle, summary, &OutputConfig::from_env()),
        OutputMode::Json => write_json(&mut handle, summary),
    }
}

/// Print a recovery summary in the specified format
pub fn print_recovery_summary(summary: &RecoverySummary, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => {
            let config = OutputConfig::from_env();
            writeln!(
                handle,
                "{} {}{}",
                success("Recovered", &config),
                info(&summary.location, &config),
                if summary.legacy {
                    warning(" (legacy format)", &config)
                } else {
                    String::new()
                }
            )?;
            writeln!(handle, "  {} {}", muted("checksum:", &config), summary.checksum)?;
            write_graph_summary(&mut handle, &summary.graph, &config)
        }
        OutputMode::Json => write_json(&mut handle, summary),
    }
}

/// Print a JSON-formatted result for any serializable value
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, value)
}

// ============================================================================
// Text Formatting
// ============================================================================

fn write_json<W: Write, T: Serialize + ?Sized>(w: &mut W, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(w, "{json}")
}

fn artifact_json(artifact: &StoredArtifact) -> serde_json::Value {
    serde_json::json!({
        "id": artifact.id,
        "path": artifact.path.display().to_string(),
        "checksum": artifact.checksum,
    })
}

fn write_artifact<W: Write>(
    w: &mut W,
    artifact: &StoredArtifact,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} {} {}",
        success("Snapshot", config),
        info(&artifact.id, config),
        muted(&format!("sha256:{}", artifact.checksum), config)
    )
}

/// Write a sync report as text.
pub fn write_sync_report<W: Write>(
    w: &mut W,
    report: &SyncReport,
    config: &OutputConfig,
) -> io::Result<()> {
    let status = if report.failures.is_empty() {
        success("Sync complete", config)
    } else if report.is_successful() {
        warning("Sync complete with failures", config)
    } else {
        error("Sync failed", config)
    };
    writeln!(w, "{} {}", header(&status, config), muted(&format!("({} tasks)", report.total), config))?;

    let rows = [
        ("created", report.created),
        ("found", report.found),
        ("updated", report.updated),
        ("unchanged", report.unchanged),
        ("labels", report.labels_reconciled),
        ("linked", report.linked),
        ("link comments", report.link_fallbacks),
        ("blocked", report.blocked_added),
        ("unblocked", report.blocked_removed),
    ];
    for (label, n) in rows {
        writeln!(w, "  {:<14}{}", muted(&format!("{label}:"), config), count(n, config))?;
    }

    for failure in &report.failures {
        let issue = failure
            .issue
            .map(|n| format!(" {}", info(&n.to_string(), config)))
            .unwrap_or_default();
        writeln!(
            w,
            "  {} task {}{issue} [{:?}/{}]: {}",
            error("✗", config),
            failure.task,
            failure.phase,
            failure.category,
            failure.message
        )?;
    }
    Ok(())
}

/// Write a full scan report as text.
pub fn write_scan_report<W: Write>(
    w: &mut W,
    report: &ScanReport,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} {} open issues: {} blocked, {} unblocked, {} unchanged",
        header("Scanned", config),
        report.scanned,
        count(report.blocked_added, config),
        count(report.blocked_removed, config),
        count(report.unchanged, config)
    )?;
    write_issue_failures(w, &report.failures, config)
}

/// Write a closure propagation report as text.
pub fn write_propagation_report<W: Write>(
    w: &mut W,
    report: &PropagationReport,
    config: &OutputConfig,
) -> io::Result<()> {
    let closed = report
        .closed
        .map_or_else(|| "issue".to_string(), |n| n.to_string());
    if report.transitions.is_empty() && report.failures.is_empty() {
        return writeln!(w, "{} has no open dependents", info(&closed, config));
    }

    writeln!(w, "{} {}", header("Closed", config), info(&closed, config))?;
    for (number, transition) in &report.transitions {
        let outcome = match transition {
            LabelTransition::Added => warning("blocked", config),
            LabelTransition::Removed => success("unblocked", config),
            LabelTransition::Unchanged => muted("unchanged", config),
        };
        writeln!(w, "  {} {outcome}", info(&number.to_string(), config))?;
    }
    write_issue_failures(w, &report.failures, config)
}

fn write_issue_failures<W: Write>(
    w: &mut W,
    failures: &[(crate::domain::IssueNumber, String)],
    config: &OutputConfig,
) -> io::Result<()> {
    for (number, message) in failures {
        writeln!(
            w,
            "  {} {}: {message}",
            error("✗", config),
            info(&number.to_string(), config)
        )?;
    }
    Ok(())
}

/// Write a graph summary as text.
pub fn write_graph_summary<W: Write>(
    w: &mut W,
    summary: &GraphSummary,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} tasks, max depth {}, complexity {}-{} (avg {:.2})",
        summary.tasks,
        summary.max_depth,
        summary.complexity.min,
        summary.complexity.max,
        summary.complexity.average
    )?;
    if !summary.cyclic_tasks.is_empty() {
        let ids: Vec<String> = summary.cyclic_tasks.iter().map(ToString::to_string).collect();
        writeln!(w, "  {} {}", warning("cycle:", config), ids.join(", "))?;
    }
    for message in &summary.warnings {
        writeln!(w, "  {} {message}", warning("warning:", config))?;
    }
    Ok(())
}
