//! External task-graph generator.
//!
//! The generator is a separate program that reads requirement documents and
//! prints a JSON object with a `tasks` array on stdout. It is invoked as
//!
//! ```text
//! <program> <args...> --complexity-threshold <n> <files...>
//! ```

use crate::error::{Error, Result};
use crate::graph::TaskGraph;
use crate::resilience::with_retry;
use crate::validation::parse_generator_output;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// How to run the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GeneratorSettings {
    /// Executable name or path
    pub program: String,
    /// Arguments placed before the threshold and input files
    pub args: Vec<String>,
    /// Score above which the generator should break a task down
    pub complexity_threshold: u8,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            program: "task-master".to_string(),
            args: vec!["parse-prd".to_string(), "--json".to_string()],
            complexity_threshold: 7,
        }
    }
}

/// Runs the generator and turns its output into a graph.
#[derive(Debug, Clone)]
pub struct Generator {
    settings: GeneratorSettings,
    max_retries: u32,
}

impl Generator {
    /// Create a generator runner.
    pub fn new(settings: GeneratorSettings, max_retries: u32) -> Self {
        Self {
            settings,
            max_retries,
        }
    }

    /// Generate a task graph from `files`.
    ///
    /// Failures to start or a non-zero exit are retried; malformed tasks in
    /// otherwise valid output are not.
    ///
    /// # Errors
    ///
    /// Returns `Error::Generator` if the program is unavailable or keeps
    /// failing, `Error::InvalidTask` naming the offending task for
    /// malformed output, and `Error::InvalidGraph` for duplicate ids.
    pub async fn generate(&self, files: &[PathBuf]) -> Result<TaskGraph> {
        let output = with_retry("generate task graph", self.max_retries, || {
            self.run_once(files)
        })
        .await?;

        let tasks = parse_generator_output(&output)?;
        info!(
            program = %self.settings.program,
            files = files.len(),
            tasks = tasks.len(),
            "Generated task graph"
        );
        TaskGraph::new(tasks)
    }

    async fn run_once(&self, files: &[PathBuf]) -> Result<String> {
        debug!(program = %self.settings.program, "Running generator");
        let output = Command::new(&self.settings.program)
            .args(&self.settings.args)
            .arg("--complexity-threshold")
            .arg(self.settings.complexity_threshold.to_string())
            .args(files)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::Generator(format!("failed to start '{}': {e}", self.settings.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Generator(format!(
                "'{}' exited with {}: {}",
                self.settings.program,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::Generator(format!("output is not UTF-8: {e}")))
    }
}
