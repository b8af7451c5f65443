//! Configuration file support for lazymake.
//!
//! lazymake supports two configuration file locations:
//! - Global: `~/.lazymake/config.toml` - User-wide defaults
//! - Project: `.lazymake/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::freshness::Freshness;

/// lazymake configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of parallel jobs (None = available parallelism)
    pub jobs: Option<usize>,

    /// Keep building independent goals after a failure (None = true)
    pub keep_going: Option<bool>,

    /// Rule file name to look for. Only read from the global config, since
    /// the project root is where the rule file is found.
    pub rulefile: Option<String>,

    /// Staleness check: "mtime" or "content"
    pub freshness: Option<String>,
}

impl Config {
    /// Load configuration from a file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()))
            }
        };

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Like [`Config::load`], but an unusable file only produces a warning.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("ignoring config: {:#}", e);
            Self::default()
        })
    }

    /// Layer `other` on top of this config. Keys set in `other` win.
    pub fn merge(&mut self, other: Config) {
        let BuildConfig {
            jobs,
            keep_going,
            rulefile,
            freshness,
        } = other.build;
        let build = &mut self.build;
        build.jobs = jobs.or(build.jobs);
        build.keep_going = keep_going.or(build.keep_going);
        build.rulefile = rulefile.or(build.rulefile.take());
        build.freshness = freshness.or(build.freshness.take());
    }

    /// Parse the freshness mode from the config string.
    pub fn freshness(&self) -> Option<Freshness> {
        self.build.freshness.as_ref().and_then(|s| {
            s.parse()
                .map_err(|e| tracing::warn!("ignoring config: {}", e))
                .ok()
        })
    }
}

/// Global config overlaid with the project config.
///
/// A `rulefile` key in the project config is dropped with a warning.
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::load_or_default(global_path);
    let mut project = Config::load_or_default(project_path);
    if let Some(name) = project.build.rulefile.take() {
        tracing::warn!(
            "ignoring `rulefile = \"{}\"` in {}: the rule file name is only read from the global config",
            name,
            project_path.display()
        );
    }
    config.merge(project);
    config
}

/// Get the global lazymake config directory (~/.lazymake).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".lazymake"))
}
