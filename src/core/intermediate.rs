//! Intermediate file classification.
//!
//! Generated files reached only through pattern rules (object files of a
//! chained rule, dependency records, generated headers) are *intermediate*
//! by default: they are deleted after the run that created them, and a
//! missing intermediate does not by itself make its dependents stale.
//!
//! `.NOTINTERMEDIATE` and `.INTERMEDIATE` declarations override the default
//! per pattern. When several overrides match, the first declared wins.

use crate::core::pattern::Pattern;

/// Result of classifying a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No override matched; the default rule applies.
    Default,
    /// Forced intermediate.
    Intermediate,
    /// Forced not intermediate.
    NotIntermediate,
}

/// How a target entered the plan, used by the default classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    /// Matched through a wildcard rule
    pub via_pattern: bool,
    /// The target is a dependency record
    pub is_record: bool,
    /// Named as a goal of this run
    pub is_goal: bool,
    /// Named literally by an exact rule
    pub mentioned: bool,
}

/// Pattern-indexed override table.
#[derive(Debug, Clone, Default)]
pub struct IntermediatePolicy {
    overrides: Vec<(Pattern, bool)>,
}

impl IntermediatePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an override for every target matching `pattern`.
    pub fn declare(&mut self, pattern: Pattern, intermediate: bool) {
        tracing::debug!(%pattern, intermediate, "intermediate override");
        self.overrides.push((pattern, intermediate));
    }

    /// Look up the override for a target name.
    pub fn classify(&self, name: &str) -> Classification {
        let hit = self
            .overrides
            .iter()
            .find(|(pattern, _)| pattern.matches(name).is_some());

        match hit {
            Some((_, true)) => Classification::Intermediate,
            Some((_, false)) => Classification::NotIntermediate,
            None => Classification::Default,
        }
    }

    /// Resolve the tri-state lookup to a yes/no answer for a target.
    ///
    /// Goals are never intermediate, whatever the overrides say.
    pub fn is_intermediate(&self, name: &str, provenance: Provenance) -> bool {
        if provenance.is_goal {
            return false;
        }
        match self.classify(name) {
            Classification::Intermediate => true,
            Classification::NotIntermediate => false,
            Classification::Default => {
                (provenance.via_pattern || provenance.is_record) && !provenance.mentioned
            }
        }
    }
}
