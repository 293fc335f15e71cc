//! CLI argument structs for all commands.

use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::domain::IssueNumber;

/// Arguments for the `sync` command
#[derive(Parser, Debug, Clone, Default)]
#[command(group(ArgGroup::new("source").required(true).args(["tasks", "generate"])))]
pub struct SyncArgs {
    /// Task graph file (`{"tasks": [...]}` or `{"master": {"tasks": [...]}}`)
    #[arg(long, value_name = "FILE")]
    pub tasks: Option<PathBuf>,

    /// Run the generator over these requirement documents
    #[arg(long, value_name = "FILES", num_args = 1..)]
    pub generate: Vec<PathBuf>,

    /// Write an artifact snapshot of the graph after syncing
    #[arg(long)]
    pub snapshot: bool,

    /// Sync against an empty in-memory tracker instead of the real one
    ///
    /// Nothing is written to the tracker or to local files, even with
    /// `--snapshot`.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `scan` command
#[derive(Parser, Debug, Clone, Default)]
pub struct ScanArgs {}

/// Arguments for the `issue-closed` command
#[derive(Parser, Debug, Clone)]
pub struct IssueClosedArgs {
    /// Number of the issue that was closed (`42` or `#42`)
    pub number: IssueNumber,
}

/// Arguments for the `recover` command
#[derive(Parser, Debug, Clone)]
pub struct RecoverArgs {
    /// Snapshot URL, or an id in the artifact directory
    pub location: String,

    /// Expected SHA-256 of the snapshot file (hex)
    #[arg(long, value_name = "HEX")]
    pub checksum: Option<String>,

    /// Expected HMAC-SHA256 signature of the snapshot file (hex)
    ///
    /// The key is read from `TASKSYNC_SIGNING_KEY`.
    #[arg(long, value_name = "HEX")]
    pub signature: Option<String>,

    /// Sync the recovered graph to the tracker
    #[arg(long)]
    pub sync: bool,

    /// With `--sync`, use an empty in-memory tracker
    #[arg(long, requires = "sync")]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Task graph or snapshot file
    pub file: PathBuf,
}
