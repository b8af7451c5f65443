//! Global context for lazymake operations.
//!
//! Provides centralized access to the working directory, the user-wide
//! lazymake home and the project-local state directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Default name of the rule file.
pub const DEFAULT_RULEFILE: &str = "Rulefile";

/// Name of the project-local state directory.
pub const PROJECT_DIR: &str = ".lazymake";

/// Error locating the rule file.
#[derive(Debug, Error)]
pub enum RulefileLookupError {
    #[error("could not find `{name}` in {} or any parent directory", .dir.display())]
    NotFound { name: String, dir: PathBuf },
}

/// Global context containing paths and output settings.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for user-wide settings (~/.lazymake/)
    home: PathBuf,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext rooted at the process working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let home = crate::util::config::global_config_dir()
            .unwrap_or_else(|| PathBuf::from(PROJECT_DIR));

        GlobalContext {
            cwd,
            home,
            verbose: false,
            color: true,
        }
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Get the project-local state directory for a build root.
    pub fn project_dir(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR)
    }

    /// Get the project configuration file path for a build root.
    pub fn project_config_path(root: &Path) -> PathBuf {
        Self::project_dir(root).join("config.toml")
    }

    /// Get the fingerprint database path for a build root.
    pub fn fingerprint_path(root: &Path) -> PathBuf {
        Self::project_dir(root).join("fingerprints.json")
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Find the rule file starting from cwd and searching upward.
    pub fn find_rulefile(&self, name: &str) -> Result<PathBuf, RulefileLookupError> {
        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                return Err(RulefileLookupError::NotFound {
                    name: name.to_string(),
                    dir: self.cwd.clone(),
                });
            }
        }
    }
}
