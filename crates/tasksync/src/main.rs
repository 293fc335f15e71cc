//! tasksync CLI binary.

use std::process::ExitCode;
use tasksync::cli::{format_fatal, Cli};
use tracing_subscriber::EnvFilter;

/// Main entry point for the tasksync CLI.
///
/// Uses tokio's current_thread runtime: batches are concurrent, but all
/// work is I/O bound and cooperative.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Can be controlled via RUST_LOG environment variable
    // Example: RUST_LOG=tasksync=debug,tasksync_json=trace cargo run
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tasksync=info,tasksync_json=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting tasksync CLI");

    let cli = Cli::parse_args();
    match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{}", format_fatal(&e));
            ExitCode::FAILURE
        }
    }
}
