//! Planning and running builds.
//!
//! [`Planner`] turns goals into a [`Plan`], [`Executor`] runs the queued
//! actions of a plan, and [`cleanup`] removes intermediates afterwards.

pub mod cleanup;
pub mod executor;
pub mod fingerprint;
pub mod freshness;
pub mod plan;
pub mod runner;

pub use executor::{ExecSummary, Executor};
pub use fingerprint::FingerprintCache;
pub use freshness::{Freshness, StaleReason};
pub use plan::{NodeState, Plan, PlanError, Planner};
pub use runner::{ActionRunner, ShellRunner};
