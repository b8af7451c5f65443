//! Action runners.
//!
//! The executor hands each queued action to an [`ActionRunner`]. The
//! default runner passes every command to `sh -c` in the build root.

use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;

use crate::util::process::ProcessBuilder;

/// One action ready to run: the target and its expanded commands.
#[derive(Debug, Clone)]
pub struct Job {
    pub target: String,
    pub commands: Vec<String>,
    pub cwd: PathBuf,
}

/// Why an action failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("`{command}` exited with status {}", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },
}

/// Executes actions. Implementations must be usable from worker threads.
pub trait ActionRunner: Send + Sync {
    fn run(&self, job: &Job) -> Result<(), ActionError>;
}

/// Runs commands through the system shell.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    /// Echo commands before running them
    pub echo: bool,
}

impl ShellRunner {
    pub fn new(echo: bool) -> Self {
        ShellRunner { echo }
    }
}

impl ActionRunner for ShellRunner {
    fn run(&self, job: &Job) -> Result<(), ActionError> {
        for command in &job.commands {
            if self.echo {
                println!("{command}");
            }
            tracing::debug!(target_name = %job.target, "running `{}`", command);

            let output = ProcessBuilder::shell(command)
                .cwd(&job.cwd)
                .exec()
                .map_err(|e| ActionError::Spawn {
                    command: command.clone(),
                    message: format!("{e:#}"),
                })?;

            // Forward output once the command finished so parallel jobs do
            // not interleave mid-line.
            let _ = std::io::stdout().write_all(&output.stdout);
            let _ = std::io::stderr().write_all(&output.stderr);

            if !output.status.success() {
                return Err(ActionError::NonZeroExit {
                    command: command.clone(),
                    code: output.status.code(),
                });
            }
        }
        Ok(())
    }
}
