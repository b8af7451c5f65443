//! Running action commands through the shell.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};

const SHELL: &str = "sh";

/// Builder for one `sh -c` invocation.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    script: String,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// A builder that runs `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        ProcessBuilder {
            script: script.into(),
            cwd: None,
        }
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Run to completion with stdin closed, capturing stdout and stderr.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = Command::new(SHELL);
        cmd.arg("-c")
            .arg(&self.script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd.output()
            .with_context(|| format!("failed to run `{}`", self))
    }
}

impl std::fmt::Display for ProcessBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -c {}", SHELL, self.script)
    }
}
