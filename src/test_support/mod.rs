//! Test utilities for lazymake unit tests.
//!
//! [`ScriptedRunner`] stands in for the shell: it records every job it is
//! given, writes the target file and any scripted raw dependency artifact,
//! and fails the targets it was told to fail.

pub mod fixtures;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::builder::runner::{ActionError, ActionRunner, Job};

pub use fixtures::*;

/// In-process action runner.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    failures: HashSet<String>,
    depfiles: HashMap<String, (String, String)>,
    calls: Mutex<Vec<Job>>,
}

impl ScriptedRunner {
    /// Create a runner where every action succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the action of `target` fail after writing a partial output.
    pub fn fail(mut self, target: &str) -> Self {
        self.failures.insert(target.to_string());
        self
    }

    /// Have the action of `target` write a raw dependency artifact.
    pub fn depfile(mut self, target: &str, path: &str, content: &str) -> Self {
        self.depfiles
            .insert(target.to_string(), (path.to_string(), content.to_string()));
        self
    }

    /// Targets whose actions ran, in order.
    pub fn targets(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.target.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ActionRunner for ScriptedRunner {
    fn run(&self, job: &Job) -> Result<(), ActionError> {
        self.calls.lock().unwrap().push(job.clone());

        if let Some((path, content)) = self.depfiles.get(&job.target) {
            std::fs::write(job.cwd.join(path), content).unwrap();
        }

        let output = job.cwd.join(&job.target);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&output, format!("built {}\n", job.target)).unwrap();

        if self.failures.contains(&job.target) {
            return Err(ActionError::NonZeroExit {
                command: job.commands.first().cloned().unwrap_or_default(),
                code: Some(1),
            });
        }
        Ok(())
    }
}
