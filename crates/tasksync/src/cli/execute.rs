//! Command execution logic.

use anyhow::{Context as _, Result};
use chrono::Utc;
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

use super::args::{IssueClosedArgs, RecoverArgs, ScanArgs, SyncArgs, ValidateArgs};
use crate::artifact::{
    ArtifactLocation, ArtifactRecovery, ArtifactSnapshot, ArtifactStore, DefaultSource,
    RecoveryOptions, StoredArtifact,
};
use crate::config::{token_from_env, TasksyncConfig, SIGNING_KEY_ENV_VAR};
use crate::domain::Task;
use crate::error::Error;
use crate::generator::Generator;
use crate::graph::TaskGraph;
use crate::ledger::ContentLedger;
use crate::output::{self, GraphSummary, OutputMode, RecoverySummary};
use crate::sync::{SyncEngine, SyncReport, SyncState};
use crate::tracker::{
    resolve_hierarchy_mode, GitHubTracker, HierarchyMode, InMemoryTracker, IssueTracker,
};
use crate::validation::{graph_warnings, validate_structure, ValidationReport};
use crate::watcher::Watcher;

/// Exit code of a run that completed while most items failed
const PARTIAL_FAILURE_EXIT: u8 = 2;

/// Load a task file in either the bare or the `master` layout.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not JSON, or fails
/// structural validation.
pub async fn load_task_file(path: &Path) -> crate::error::Result<(TaskGraph, ValidationReport)> {
    let bytes = tokio::fs::read(path).await?;
    let root: serde_json::Value = serde_json::from_slice(&bytes)?;

    let tasks = root
        .get("master")
        .and_then(|master| master.get("tasks"))
        .or_else(|| root.get("tasks"))
        .ok_or_else(|| {
            Error::InvalidGraph(format!("{} has no 'tasks' array", path.display()))
        })?;

    let mut report = validate_structure(tasks)?;
    let tasks: Vec<Task> = serde_json::from_value(tasks.clone())?;
    let graph = TaskGraph::new(tasks)?;
    report.warnings.extend(graph_warnings(&graph).warnings);
    Ok((graph, report))
}

fn github_tracker(config: &TasksyncConfig) -> Result<GitHubTracker> {
    let repository = config.require_repository()?;
    let token = token_from_env()?;
    Ok(GitHubTracker::new(&config.api_url, repository, token)?)
}

/// Sync `graph` to the configured tracker, or to an empty in-memory one.
async fn run_sync(config: &TasksyncConfig, graph: &TaskGraph, dry_run: bool) -> Result<SyncReport> {
    let (tracker, ledger): (Box<dyn IssueTracker>, ContentLedger) = if dry_run {
        info!("Dry run: syncing against an in-memory tracker");
        (Box::new(InMemoryTracker::new()), ContentLedger::in_memory())
    } else {
        let ledger = ContentLedger::load(&config.state_file)
            .await
            .with_context(|| format!("Failed to load {}", config.state_file.display()))?;
        (Box::new(github_tracker(config)?), ledger)
    };

    let mode = resolve_hierarchy_mode(tracker.as_ref(), config.hierarchy).await;
    let engine = SyncEngine::new(tracker.as_ref(), config.sync_options(mode));
    let mut state = SyncState::new(ledger);
    let outcome = engine.sync(graph, &mut state).await?;
    Ok(outcome.report)
}

async fn write_snapshot(
    config: &TasksyncConfig,
    graph: &TaskGraph,
    sources: Vec<String>,
) -> Result<StoredArtifact> {
    let retention = config.retention_policy();
    let store = ArtifactStore::new(&config.artifact_dir, retention);
    let snapshot = ArtifactSnapshot::from_graph(graph, sources, retention, Utc::now())?;
    let stored = store.write(&snapshot).await?;
    store.prune(Utc::now()).await?;
    Ok(stored)
}

fn exit_code(report: &SyncReport) -> ExitCode {
    if report.is_successful() {
        ExitCode::SUCCESS
    } else {
        warn!(
            failed = report.failed_tasks(),
            total = report.total,
            "Most tasks failed to sync"
        );
        ExitCode::from(PARTIAL_FAILURE_EXIT)
    }
}

/// Execute the sync command
pub async fn execute_sync(
    config: &TasksyncConfig,
    args: &SyncArgs,
    output_mode: OutputMode,
) -> Result<ExitCode> {
    let (graph, sources) = if let Some(path) = &args.tasks {
        let (graph, _warnings) = load_task_file(path)
            .await
            .with_context(|| format!("Failed to load tasks from {}", path.display()))?;
        (graph, vec![path.display().to_string()])
    } else {
        let generator = Generator::new(config.generator.clone(), config.max_retries);
        let graph = generator.generate(&args.generate).await?;
        let sources = args.generate.iter().map(|p| p.display().to_string()).collect();
        (graph, sources)
    };

    let report = run_sync(config, &graph, args.dry_run).await?;

    let artifact = match (args.snapshot, args.dry_run) {
        (true, false) => Some(write_snapshot(config, &graph, sources).await?),
        (true, true) => {
            info!("Dry run: skipping artifact snapshot");
            None
        }
        (false, _) => None,
    };

    output::print_sync_report(&report, artifact.as_ref(), output_mode)?;
    Ok(exit_code(&report))
}

/// Execute the scan command
pub async fn execute_scan(
    config: &TasksyncConfig,
    _args: &ScanArgs,
    output_mode: OutputMode,
) -> Result<ExitCode> {
    let tracker = github_tracker(config)?;
    let report = Watcher::new(&tracker, config.sync_options(HierarchyMode::Native))
        .full_scan()
        .await?;
    output::print_scan_report(&report, output_mode)?;
    Ok(ExitCode::SUCCESS)
}

/// Execute the issue-closed command
pub async fn execute_issue_closed(
    config: &TasksyncConfig,
    args: &IssueClosedArgs,
    output_mode: OutputMode,
) -> Result<ExitCode> {
    let tracker = github_tracker(config)?;
    let report = Watcher::new(&tracker, config.sync_options(HierarchyMode::Native))
        .issue_closed(args.number)
        .await?;
    output::print_propagation_report(&report, output_mode)?;
    Ok(ExitCode::SUCCESS)
}

/// Execute the recover command
pub async fn execute_recover(
    config: &TasksyncConfig,
    args: &RecoverArgs,
    output_mode: OutputMode,
) -> Result<ExitCode> {
    let location: ArtifactLocation = args.location.parse()?;
    let options = RecoveryOptions {
        expected_checksum: args.checksum.clone(),
        signature: args.signature.clone(),
        signing_key: std::env::var(SIGNING_KEY_ENV_VAR)
            .ok()
            .filter(|key| !key.is_empty())
            .map(String::into_bytes),
        max_retries: config.max_retries,
    };

    let source = DefaultSource::new(&config.artifact_dir)?;
    let recovered = ArtifactRecovery::new(&source, options)
        .recover(&location)
        .await?;

    if !args.sync {
        let summary = RecoverySummary::new(location.to_string(), &recovered);
        output::print_recovery_summary(&summary, output_mode)?;
        return Ok(ExitCode::SUCCESS);
    }

    let report = run_sync(config, &recovered.graph, args.dry_run).await?;
    output::print_sync_report(&report, None, output_mode)?;
    Ok(exit_code(&report))
}

/// Execute the validate command
pub async fn execute_validate(args: &ValidateArgs, output_mode: OutputMode) -> Result<ExitCode> {
    let (graph, warnings) = load_task_file(&args.file)
        .await
        .with_context(|| format!("Failed to validate {}", args.file.display()))?;
    output::print_graph_summary(&GraphSummary::new(&graph, &warnings), output_mode)?;
    Ok(ExitCode::SUCCESS)
}
