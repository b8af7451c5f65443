//! The target graph: declared rules, phony targets and intermediate
//! overrides.
//!
//! The graph is immutable once declared. Prerequisites added by lazy
//! providers live in the build plan, not here.

use std::collections::HashSet;

use crate::core::intermediate::IntermediatePolicy;
use crate::core::pattern::{Pattern, PatternTable};
use crate::core::rule::{Action, LazyProviderSpec, Rule};

/// A rule selected for a target name.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'g, 'n> {
    pub rule: &'g Rule,
    pub stem: &'n str,
}

impl RuleMatch<'_, '_> {
    /// Static prerequisites instantiated for this match.
    pub fn prereqs(&self) -> Vec<String> {
        self.rule.prereqs_for(self.stem)
    }

    /// Lazy record path for this match, if the rule declares one.
    pub fn record(&self) -> Option<String> {
        self.rule.record_for(self.stem)
    }

    pub fn via_pattern(&self) -> bool {
        self.rule.target.is_wildcard()
    }
}

/// Declared rules and target metadata.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    rules: PatternTable<Rule>,
    phony: HashSet<String>,
    intermediate: IntermediatePolicy,
    mentioned: HashSet<String>,
    first_target: Option<String>,
}

impl TargetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a rule.
    pub fn declare_rule(
        &mut self,
        pattern: Pattern,
        static_prereqs: Vec<String>,
        lazy: Option<LazyProviderSpec>,
        action: Option<Action>,
    ) {
        self.add_rule(Rule {
            target: pattern,
            prereqs: static_prereqs,
            lazy,
            action,
        });
    }

    /// Declare a prebuilt rule.
    pub fn add_rule(&mut self, rule: Rule) {
        if let Pattern::Exact(ref name) = rule.target {
            if self.first_target.is_none() && !name.starts_with('.') {
                self.first_target = Some(name.clone());
            }
            self.mentioned.insert(name.clone());
            self.mentioned.extend(rule.prereqs.iter().cloned());
        }
        tracing::trace!(rule = %rule, "declared rule");
        self.rules.push(rule.target.clone(), rule);
    }

    /// Mark a target as phony.
    pub fn declare_phony(&mut self, name: impl Into<String>) {
        self.phony.insert(name.into());
    }

    /// Force (or suppress) intermediate classification for a pattern.
    pub fn declare_intermediate_override(&mut self, pattern: Pattern, is_intermediate: bool) {
        self.intermediate.declare(pattern, is_intermediate);
    }

    /// The best rule for a target name.
    pub fn match_target<'g, 'n>(&'g self, name: &'n str) -> Option<RuleMatch<'g, 'n>> {
        self.rules
            .lookup(name)
            .map(|(_, rule, stem)| RuleMatch { rule, stem })
    }

    /// All rules matching a name, in precedence order.
    pub fn candidates<'g, 'n>(&'g self, name: &'n str) -> Vec<RuleMatch<'g, 'n>> {
        self.rules
            .matches(name)
            .into_iter()
            .map(|(_, rule, stem)| RuleMatch { rule, stem })
            .collect()
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.lookup(name).is_some()
    }

    pub fn is_phony(&self, name: &str) -> bool {
        self.phony.contains(name)
    }

    /// Whether a name is written literally as an exact rule target or as a
    /// static prerequisite of an exact rule.
    pub fn mentioned_explicitly(&self, name: &str) -> bool {
        self.mentioned.contains(name)
    }

    pub fn intermediate_policy(&self) -> &IntermediatePolicy {
        &self.intermediate
    }

    /// The default goal: the first exact, non-dot target declared.
    pub fn default_goal(&self) -> Option<&str> {
        self.first_target.as_deref()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
