//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `sync`: Push a task graph to the tracker
//! - `scan`: Re-resolve the blocked state of every open managed issue
//! - `issue-closed`: Propagate one closed issue to its dependents
//! - `recover`: Rebuild a task graph from an artifact snapshot
//! - `validate`: Check a task file and summarize its shape
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//! - `--config`: Configuration file (default `.tasksync/config.yaml`)
//!
//! # Example
//!
//! ```bash
//! tasksync sync --tasks .taskmaster/tasks/tasks.json --snapshot
//! tasksync issue-closed 42
//! tasksync recover snapshot-20261016T120000.000Z --checksum 9f86d0... --sync
//! ```

mod args;
mod execute;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

pub use args::{IssueClosedArgs, RecoverArgs, ScanArgs, SyncArgs, ValidateArgs};
pub use execute::load_task_file;

use crate::config::{default_config_path, TasksyncConfig};
use crate::error::Error;
use crate::output::OutputMode;
use crate::resilience::ErrorCategory;

/// tasksync - keep a task graph and a remote issue tracker in step
///
/// Creates and updates one issue per task, keeps dependency checklists and
/// `blocked` labels current, and can rebuild a graph from stored snapshots.
#[derive(Parser, Debug)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sync a task graph to the tracker
    ///
    /// Reads the graph from a task file or runs the generator, then finds or
    /// creates one issue per task and brings bodies and labels up to date.
    /// Unchanged issues are not written.
    Sync(SyncArgs),

    /// Re-resolve the blocked state of every open managed issue
    Scan(ScanArgs),

    /// Propagate the closure of an issue to its dependents
    IssueClosed(IssueClosedArgs),

    /// Recover a task graph from an artifact snapshot
    ///
    /// The snapshot is verified against the given checksum and signature
    /// before it is used. Legacy snapshot layouts are upgraded on load.
    Recover(RecoverArgs),

    /// Validate a task file and print a depth summary
    Validate(ValidateArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    ///
    /// Returns exit code 2 when a sync completed but most tasks failed.
    pub async fn execute(&self) -> Result<ExitCode> {
        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        if let Commands::Validate(args) = &self.command {
            return execute::execute_validate(args, output_mode).await;
        }

        let config_path = self.config.clone().unwrap_or_else(default_config_path);
        let config = TasksyncConfig::load(&config_path).await?;

        match &self.command {
            Commands::Sync(args) => execute::execute_sync(&config, args, output_mode).await,
            Commands::Scan(args) => execute::execute_scan(&config, args, output_mode).await,
            Commands::IssueClosed(args) => {
                execute::execute_issue_closed(&config, args, output_mode).await
            }
            Commands::Recover(args) => execute::execute_recover(&config, args, output_mode).await,
            Commands::Validate(args) => execute::execute_validate(args, output_mode).await,
        }
    }
}

/// Resilience category of a top-level failure.
///
/// Errors that did not originate in tasksync are `unknown`.
pub fn error_category(error: &anyhow::Error) -> ErrorCategory {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(ErrorCategory::Unknown, Error::category)
}

/// One-line rendering of a fatal error: `error [<category>]: <message>`.
pub fn format_fatal(error: &anyhow::Error) -> String {
    format!("error [{}]: {error:#}", error_category(error))
}
