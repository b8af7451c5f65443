//! Core data structures for lazymake.
//!
//! - Target patterns and the tables that match names against them
//! - Rules, actions and lazy provider declarations
//! - The declared target graph and intermediate classification
//! - Rulefile parsing

pub mod graph;
pub mod intermediate;
pub mod pattern;
pub mod rule;
pub mod rulefile;

pub use graph::{RuleMatch, TargetGraph};
pub use intermediate::{Classification, IntermediatePolicy, Provenance};
pub use pattern::{Pattern, PatternError, PatternTable};
pub use rule::{Action, AutoVars, LazyProviderSpec, Rule};
