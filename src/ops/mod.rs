//! High-level operations.
//!
//! This module contains the implementation of lazymake commands.

pub mod lazymake_build;
pub mod lazymake_depfile;

pub use lazymake_build::{
    build, dry_run, run_build, BuildError, BuildOptions, BuildReport, BuildSettings, GoalResult,
    GoalStatus,
};
pub use lazymake_depfile::postprocess_depfile;
