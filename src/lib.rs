//! lazymake - an incremental, make-like build engine
//!
//! Targets are matched against exact and `%` pattern rules. Header
//! prerequisites discovered by the compiler are kept in per-target
//! dependency records that are only read when their target is visited,
//! and intermediate files created along the way are cleaned up after the
//! build.

pub mod builder;
pub mod core;
pub mod depfile;
pub mod ops;
pub mod util;

/// Test utilities for lazymake unit tests.
#[cfg(test)]
pub mod test_support;

pub use builder::{Executor, Freshness, Plan, Planner};
pub use core::{Pattern, Rule, TargetGraph};
pub use depfile::DepStore;
pub use util::context::GlobalContext;
