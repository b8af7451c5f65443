//! Build planning.
//!
//! The planner walks the target graph depth-first from each goal. A node is
//! created the first time a name is reached; its static prerequisites are
//! visited, then its lazy provider is resolved (exactly once per run) and
//! the lazily added prerequisites are visited. Once every prerequisite has
//! been decided the node itself is decided: up to date, queued for
//! rebuilding, or deferred when it is a missing intermediate nobody needs
//! yet.
//!
//! Only targets reachable from a goal are ever visited, so the dependency
//! record of an unrelated target is never opened.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::SystemTime;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;

use crate::builder::fingerprint::{ActionFingerprint, FingerprintCache};
use crate::builder::freshness::{Freshness, StaleReason};
use crate::core::graph::{RuleMatch, TargetGraph};
use crate::core::intermediate::Provenance;
use crate::core::rule::{Action, AutoVars};
use crate::depfile::store::{DepStore, StoreError};

/// Errors that stop a goal from being planned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("no rule to make target `{target}`{}", .needed_by.as_ref().map(|n| format!(", needed by `{n}`")).unwrap_or_default())]
    NoRuleFound {
        target: String,
        needed_by: Option<String>,
    },

    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Lazily loaded prerequisites of one node.
///
/// Starts `Unresolved` and moves to `Resolved` or `Unavailable` the first
/// time it is resolved. Later calls do not touch the record again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LazyPrereqs {
    /// The rule declares no provider
    None,
    Unresolved {
        record: String,
    },
    Resolved {
        record: String,
        prereqs: Vec<String>,
    },
    /// The record is missing or unusable; the owner must be rebuilt
    Unavailable {
        record: String,
        reason: String,
    },
}

impl LazyPrereqs {
    pub fn record(&self) -> Option<&str> {
        match self {
            LazyPrereqs::None => None,
            LazyPrereqs::Unresolved { record }
            | LazyPrereqs::Resolved { record, .. }
            | LazyPrereqs::Unavailable { record, .. } => Some(record),
        }
    }

    pub fn prereqs(&self) -> &[String] {
        match self {
            LazyPrereqs::Resolved { prereqs, .. } => prereqs,
            _ => &[],
        }
    }

    /// Read the record if this has not been done yet. Returns whether the
    /// record was read by this call.
    pub fn resolve(&mut self, store: &DepStore) -> bool {
        let LazyPrereqs::Unresolved { record } = self else {
            return false;
        };
        let record = std::mem::take(record);

        *self = match store.read(&record) {
            Ok(prereqs) => {
                tracing::trace!("loaded {} prerequisite(s) from {}", prereqs.len(), record);
                LazyPrereqs::Resolved { record, prereqs }
            }
            Err(StoreError::NotFound(_)) => {
                tracing::debug!("no dependency record {} yet", record);
                LazyPrereqs::Unavailable {
                    record,
                    reason: "record does not exist".to_string(),
                }
            }
            Err(e) => {
                tracing::warn!("{}; its target will be rebuilt", e);
                LazyPrereqs::Unavailable {
                    record,
                    reason: e.to_string(),
                }
            }
        };
        true
    }
}

/// Why a queued node did not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
    /// A prerequisite's action failed
    UpstreamFailed(String),
    /// The build stopped after a failure elsewhere
    Cancelled,
}

/// Lifecycle of a node within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Visiting,
    PrereqsResolved,
    UpToDate,
    /// Missing intermediate that nothing has needed yet
    Deferred,
    Queued,
    Building,
    Built,
    Failed(String),
    Skipped(SkipCause),
    /// Planning failed at or below this node
    PlanFailed(PlanError),
}

/// A target reached from some goal.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub name: String,
    pub phony: bool,
    pub intermediate: bool,
    /// Whether a rule was selected; false for plain source files
    pub has_rule: bool,
    pub stem: String,
    pub action: Option<Action>,
    pub static_prereqs: Vec<String>,
    pub lazy: LazyPrereqs,
    /// Static then lazy prerequisites that take part in the build
    pub prereqs: Vec<String>,
    /// Lazily listed prerequisites that no longer exist and have no rule
    pub vanished: Vec<String>,
    /// Modification time when planning started
    pub mtime: Option<SystemTime>,
    /// For deferred nodes: newest modification time among their inputs
    pub newest_input: Option<SystemTime>,
    pub state: NodeState,
    pub reason: Option<StaleReason>,
}

impl PlanNode {
    pub fn record(&self) -> Option<&str> {
        self.lazy.record()
    }

    /// Path the action is told to write the raw dependency artifact to.
    pub fn depfile(&self) -> Option<String> {
        self.record().map(DepStore::raw_path_for)
    }

    /// The first static prerequisite, i.e. `$<`.
    pub fn primary_source(&self) -> Option<&str> {
        self.static_prereqs.first().map(String::as_str)
    }

    /// Expanded commands for the prerequisites known at planning time.
    pub fn commands(&self) -> Vec<String> {
        self.commands_for(&self.prereqs)
    }

    /// Expanded commands for an explicit prerequisite list.
    pub fn commands_for(&self, prereqs: &[String]) -> Vec<String> {
        let depfile = self.depfile();
        let vars = AutoVars {
            target: &self.name,
            stem: &self.stem,
            prereqs,
            depfile: depfile.as_deref(),
        };
        self.action
            .as_ref()
            .map(|action| action.expand(&vars))
            .unwrap_or_default()
    }
}

/// Static prerequisites followed by lazily added ones, without duplicates
/// or the target itself.
pub fn merge_prereqs(target: &str, statics: &[String], lazy: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    statics
        .iter()
        .chain(lazy)
        .filter(|p| p.as_str() != target && seen.insert(p.as_str()))
        .cloned()
        .collect()
}

/// The result of planning: the reachable subgraph with every node decided.
///
/// Edges point from a prerequisite to the target that depends on it.
#[derive(Debug, Default)]
pub struct Plan {
    graph: DiGraph<PlanNode, ()>,
    index: HashMap<String, NodeIndex>,
    goals: Vec<(String, Result<NodeIndex, PlanError>)>,
    provider_calls: BTreeMap<String, usize>,
}

impl Plan {
    pub fn node(&self, idx: NodeIndex) -> &PlanNode {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut PlanNode {
        &mut self.graph[idx]
    }

    pub fn lookup(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    /// Look up a node by target name.
    pub fn get(&self, name: &str) -> Option<&PlanNode> {
        self.lookup(name).map(|idx| &self.graph[idx])
    }

    pub fn goals(&self) -> &[(String, Result<NodeIndex, PlanError>)] {
        &self.goals
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &PlanNode)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx, &self.graph[idx]))
    }

    pub fn prereqs_of(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, Direction::Incoming)
    }

    pub fn dependents_of(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, Direction::Outgoing)
    }

    /// Queued nodes, prerequisites first.
    pub fn build_order(&self) -> Vec<NodeIndex> {
        // The planner rejects cycles, so the sort cannot fail; fall back to
        // insertion order just in case.
        let order = toposort(&self.graph, None)
            .unwrap_or_else(|_| self.graph.node_indices().collect());
        order
            .into_iter()
            .filter(|&idx| self.graph[idx].state == NodeState::Queued)
            .collect()
    }

    /// Number of queued nodes that have an action to run.
    pub fn action_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|n| n.state == NodeState::Queued && n.action.is_some())
            .count()
    }

    /// How many times the lazy provider of `target` was invoked.
    pub fn provider_invocations(&self, target: &str) -> usize {
        self.provider_calls.get(target).copied().unwrap_or(0)
    }

    pub fn provider_calls(&self) -> &BTreeMap<String, usize> {
        &self.provider_calls
    }
}

/// Plans a set of goals against a target graph.
pub struct Planner<'a> {
    graph: &'a TargetGraph,
    store: &'a DepStore,
    freshness: Freshness,
    fingerprints: Option<&'a FingerprintCache>,
    goals: HashSet<String>,
    stack: Vec<NodeIndex>,
    plan: Plan,
}

impl<'a> Planner<'a> {
    pub fn new(graph: &'a TargetGraph, store: &'a DepStore) -> Self {
        Planner {
            graph,
            store,
            freshness: Freshness::Mtime,
            fingerprints: None,
            goals: HashSet::new(),
            stack: Vec::new(),
            plan: Plan::default(),
        }
    }

    pub fn freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    /// Fingerprints consulted in `Freshness::Content` mode.
    pub fn fingerprints(mut self, cache: &'a FingerprintCache) -> Self {
        self.fingerprints = Some(cache);
        self
    }

    /// Plan every goal. Failures are recorded per goal; planning continues
    /// with the next goal.
    pub fn plan(mut self, goals: &[String]) -> Plan {
        self.goals = goals.iter().cloned().collect();

        for goal in goals {
            let result = self.visit(goal, None);
            if let Err(ref e) = result {
                tracing::debug!("planning `{}` failed: {}", goal, e);
            }
            self.plan.goals.push((goal.clone(), result));
        }

        tracing::debug!(
            "planned {} node(s), {} action(s) to run",
            self.plan.len(),
            self.plan.action_count()
        );
        self.plan
    }

    fn root(&self) -> &Path {
        self.store.root()
    }

    fn visit(&mut self, name: &str, needed_by: Option<&str>) -> Result<NodeIndex, PlanError> {
        if let Some(idx) = self.plan.lookup(name) {
            return match &self.plan.graph[idx].state {
                NodeState::Visiting => Err(self.cycle_through(idx)),
                NodeState::PlanFailed(e) => Err(e.clone()),
                _ => Ok(idx),
            };
        }

        let path = self.root().join(name);
        let mtime = crate::util::fs::mtime(&path).unwrap_or_else(|e| {
            tracing::warn!("cannot stat {}: {}", path.display(), e);
            None
        });
        let phony = self.graph.is_phony(name);
        let selected = self.select_rule(name, mtime.is_some());

        if selected.is_none() && !phony && mtime.is_none() {
            return Err(PlanError::NoRuleFound {
                target: name.to_string(),
                needed_by: needed_by.map(str::to_string),
            });
        }

        let node = self.new_node(name, phony, mtime, selected);
        let idx = self.plan.graph.add_node(node);
        self.plan.index.insert(name.to_string(), idx);

        self.stack.push(idx);
        let result = self.visit_prereqs(idx);
        self.stack.pop();

        match result {
            Ok(()) => {
                self.plan.graph[idx].state = NodeState::PrereqsResolved;
                self.decide(idx);
                Ok(idx)
            }
            Err(e) => {
                self.plan.graph[idx].state = NodeState::PlanFailed(e.clone());
                Err(e)
            }
        }
    }

    /// Pick the rule for a name. Exact rules always apply. A wildcard rule
    /// applies only if its static prerequisites exist or can be made; when
    /// none applies the first candidate is used for a missing target, so
    /// the error names the missing prerequisite.
    fn select_rule<'n>(&self, name: &'n str, exists: bool) -> Option<RuleMatch<'a, 'n>> {
        let mut fallback = None;

        for candidate in self.graph.candidates(name) {
            if !candidate.via_pattern() {
                return Some(candidate);
            }
            if candidate.prereqs().iter().all(|p| self.can_make(p)) {
                return Some(candidate);
            }
            tracing::trace!("rule `{}` does not apply to {}", candidate.rule, name);
            fallback.get_or_insert(candidate);
        }

        if exists {
            None
        } else {
            fallback
        }
    }

    fn can_make(&self, name: &str) -> bool {
        self.plan.index.contains_key(name)
            || self.graph.has_rule(name)
            || self.graph.is_phony(name)
            || self.root().join(name).exists()
    }

    fn new_node(
        &self,
        name: &str,
        phony: bool,
        mtime: Option<SystemTime>,
        selected: Option<RuleMatch<'a, '_>>,
    ) -> PlanNode {
        let via_pattern = selected.map_or(false, |m| m.via_pattern());
        let provenance = Provenance {
            via_pattern,
            is_record: false,
            is_goal: self.goals.contains(name),
            mentioned: self.graph.mentioned_explicitly(name),
        };
        let intermediate = !phony
            && self
                .graph
                .intermediate_policy()
                .is_intermediate(name, provenance);

        let (stem, action, static_prereqs, lazy) = match selected {
            Some(m) => (
                m.stem.to_string(),
                m.rule.action.clone(),
                m.prereqs(),
                m.record()
                    .map_or(LazyPrereqs::None, |record| LazyPrereqs::Unresolved { record }),
            ),
            None => (String::new(), None, Vec::new(), LazyPrereqs::None),
        };

        PlanNode {
            name: name.to_string(),
            phony,
            intermediate,
            has_rule: selected.is_some(),
            stem,
            action,
            static_prereqs,
            lazy,
            prereqs: Vec::new(),
            vanished: Vec::new(),
            mtime,
            newest_input: None,
            state: NodeState::Visiting,
            reason: None,
        }
    }

    fn visit_prereqs(&mut self, idx: NodeIndex) -> Result<(), PlanError> {
        let name = self.plan.graph[idx].name.clone();
        let statics = self.plan.graph[idx].static_prereqs.clone();

        for prereq in &statics {
            let pidx = self.visit(prereq, Some(name.as_str()))?;
            self.plan.graph.update_edge(pidx, idx, ());
        }

        if self.plan.graph[idx].lazy.resolve(self.store) {
            *self.plan.provider_calls.entry(name.clone()).or_default() += 1;
        }

        let lazy = merge_prereqs(&name, &[], self.plan.graph[idx].lazy.prereqs());
        let mut vanished = Vec::new();
        let mut linked = Vec::new();
        for prereq in lazy.into_iter().filter(|p| !statics.contains(p)) {
            match self.visit(&prereq, Some(name.as_str())) {
                Ok(pidx) => {
                    self.plan.graph.update_edge(pidx, idx, ());
                    linked.push(prereq);
                }
                // A header removed since the record was written: the record
                // is outdated, not the build graph.
                Err(PlanError::NoRuleFound { ref target, .. }) if *target == prereq => {
                    tracing::debug!("`{}` listed for `{}` no longer exists", prereq, name);
                    vanished.push(prereq);
                }
                Err(e) => return Err(e),
            }
        }

        let node = &mut self.plan.graph[idx];
        node.prereqs = merge_prereqs(&name, &statics, &linked);
        node.vanished = vanished;
        Ok(())
    }

    fn cycle_through(&self, idx: NodeIndex) -> PlanError {
        let start = self.stack.iter().position(|&i| i == idx).unwrap_or(0);
        let mut cycle: Vec<String> = self.stack[start..]
            .iter()
            .map(|&i| self.plan.graph[i].name.clone())
            .collect();
        cycle.push(self.plan.graph[idx].name.clone());
        PlanError::CircularDependency { cycle }
    }

    /// Decide a node whose prerequisites are all decided.
    fn decide(&mut self, idx: NodeIndex) {
        let node = &self.plan.graph[idx];

        if node.phony {
            self.queue(idx, StaleReason::Phony);
            return;
        }
        if !node.has_rule {
            self.plan.graph[idx].state = NodeState::UpToDate;
            return;
        }

        let mut reason = None;
        let mut newest: Option<(SystemTime, &str)> = None;
        let mut any_deferred = false;

        for prereq in &node.prereqs {
            let Some(pidx) = self.plan.lookup(prereq) else {
                continue;
            };
            let p = &self.plan.graph[pidx];
            let time = match p.state {
                NodeState::Queued => {
                    reason.get_or_insert_with(|| StaleReason::PrereqRebuilt(p.name.clone()));
                    None
                }
                NodeState::Deferred => {
                    any_deferred = true;
                    p.newest_input
                }
                _ => p.mtime,
            };
            if let Some(t) = time {
                if newest.map_or(true, |(n, _)| t > n) {
                    newest = Some((t, prereq.as_str()));
                }
            }
        }

        if reason.is_none() {
            if let Some(gone) = node.vanished.first() {
                reason = Some(StaleReason::PrereqVanished(gone.clone()));
            }
        }
        if reason.is_none() {
            if let LazyPrereqs::Unavailable { reason: why, .. } = &node.lazy {
                reason = Some(StaleReason::RecordUnavailable(why.clone()));
            }
        }

        let reason = match (node.mtime, reason) {
            (_, Some(r)) => Some(r),
            (None, None) if node.intermediate => {
                tracing::debug!("`{}` is a missing intermediate; deferred", node.name);
                let newest_input = newest.map(|(t, _)| t);
                let node = &mut self.plan.graph[idx];
                node.newest_input = newest_input;
                node.state = NodeState::Deferred;
                return;
            }
            (None, None) => Some(StaleReason::Missing),
            (Some(own), None) => self.compare(node, own, newest, any_deferred),
        };

        match reason {
            Some(r) => self.queue(idx, r),
            None => {
                tracing::trace!("`{}` is up to date", self.plan.graph[idx].name);
                self.plan.graph[idx].state = NodeState::UpToDate;
            }
        }
    }

    /// Compare an existing target with its inputs.
    fn compare(
        &self,
        node: &PlanNode,
        own: SystemTime,
        newest: Option<(SystemTime, &str)>,
        any_deferred: bool,
    ) -> Option<StaleReason> {
        if self.freshness == Freshness::Content && !any_deferred {
            if let Some(recorded) = self.fingerprints.and_then(|c| c.get(&node.name)) {
                return match ActionFingerprint::compute(self.root(), &node.commands(), &node.prereqs)
                {
                    Ok(current) if current.matches(recorded) => None,
                    Ok(_) => Some(StaleReason::FingerprintChanged),
                    Err(e) => {
                        tracing::debug!("cannot fingerprint `{}`: {:#}", node.name, e);
                        Some(StaleReason::FingerprintChanged)
                    }
                };
            }
        }

        match newest {
            Some((t, prereq)) if t > own => Some(StaleReason::PrereqNewer(prereq.to_string())),
            _ => None,
        }
    }

    /// Queue a node and every deferred intermediate it needs.
    fn queue(&mut self, idx: NodeIndex, reason: StaleReason) {
        tracing::debug!("`{}` is stale: {}", self.plan.graph[idx].name, reason);
        let node = &mut self.plan.graph[idx];
        node.state = NodeState::Queued;
        node.reason = Some(reason);

        let mut pending = vec![idx];
        while let Some(current) = pending.pop() {
            let deferred: Vec<NodeIndex> = self
                .plan
                .prereqs_of(current)
                .filter(|&p| self.plan.graph[p].state == NodeState::Deferred)
                .collect();
            for p in deferred {
                let node = &mut self.plan.graph[p];
                tracing::debug!("`{}` is needed; no longer deferred", node.name);
                node.state = NodeState::Queued;
                node.reason = Some(StaleReason::Missing);
                pending.push(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pattern::Pattern;
    use crate::core::rulefile;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn goals(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn write_at(dir: &TempDir, name: &str, content: &str, age_secs: u64) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        set_mtime(&path, SystemTime::now() - Duration::from_secs(age_secs));
    }

    const RULES: &str = "\
prog: a.o b.o action: cc -o $@ $^
%.o: %.c, .deps/%.d action: cc -MMD -MF $(DEPFILE) -c $< -o $@
.NOTINTERMEDIATE: %.d
";

    #[test]
    fn test_unreachable_provider_is_never_invoked() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", RULES).unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);
        write_at(&tmp, "b.c", "", 100);
        write_at(&tmp, "c.c", "", 100);

        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        assert_eq!(plan.provider_invocations("a.o"), 1);
        assert_eq!(plan.provider_invocations("b.o"), 0);
        assert!(plan.get("c.o").is_none());
    }

    #[test]
    fn test_provider_runs_once_per_run() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse(
            "Rulefile",
            "all: x y\nx: a.o\ny: a.o\n%.o: %.c, %.d\n.PHONY: all x y\n",
        )
        .unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);

        let plan = Planner::new(&graph, &store).plan(&goals(&["all", "a.o"]));
        assert_eq!(plan.provider_invocations("a.o"), 1);
    }

    #[test]
    fn test_fresh_target_with_record_is_up_to_date() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", RULES).unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);
        write_at(&tmp, "a.h", "", 100);
        write_at(&tmp, "a.o", "", 50);
        store.write(".deps/a.d", &goals(&["a.h"])).unwrap();

        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        let node = plan.get("a.o").unwrap();
        assert_eq!(node.state, NodeState::UpToDate);
        assert_eq!(node.prereqs, goals(&["a.c", "a.h"]));
        assert_eq!(
            node.commands(),
            vec!["cc -MMD -MF .deps/a.Td -c a.c -o a.o".to_string()]
        );
    }

    #[test]
    fn test_newer_lazy_prereq_makes_target_stale() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", RULES).unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);
        write_at(&tmp, "a.o", "", 50);
        write_at(&tmp, "a.h", "", 10);
        store.write(".deps/a.d", &goals(&["a.h"])).unwrap();

        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        let node = plan.get("a.o").unwrap();
        assert_eq!(node.state, NodeState::Queued);
        assert_eq!(node.reason, Some(StaleReason::PrereqNewer("a.h".to_string())));
    }

    #[test]
    fn test_missing_or_malformed_record_means_stale() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", RULES).unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);
        write_at(&tmp, "a.o", "", 50);

        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        assert!(matches!(
            plan.get("a.o").unwrap().reason,
            Some(StaleReason::RecordUnavailable(_))
        ));

        write_at(&tmp, ".deps/a.d", "", 10);
        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        assert_eq!(plan.get("a.o").unwrap().state, NodeState::Queued);
    }

    #[test]
    fn test_vanished_header_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", RULES).unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);
        write_at(&tmp, "a.o", "", 50);
        store.write(".deps/a.d", &goals(&["gone.h"])).unwrap();

        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        assert!(plan.goals()[0].1.is_ok());
        let node = plan.get("a.o").unwrap();
        assert_eq!(node.vanished, goals(&["gone.h"]));
        assert_eq!(
            node.reason,
            Some(StaleReason::PrereqVanished("gone.h".to_string()))
        );
    }

    #[test]
    fn test_missing_static_prereq_fails_only_its_goal() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", "x: missing.c\ny: y.c\n").unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "y.c", "", 100);

        let plan = Planner::new(&graph, &store).plan(&goals(&["x", "y"]));
        assert_eq!(
            plan.goals()[0].1,
            Err(PlanError::NoRuleFound {
                target: "missing.c".to_string(),
                needed_by: Some("x".to_string()),
            })
        );
        assert!(plan.goals()[1].1.is_ok());
        assert!(matches!(
            plan.get("x").unwrap().state,
            NodeState::PlanFailed(_)
        ));
    }

    #[test]
    fn test_cycle_is_named() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", "a: b\nb: c\nc: a\n").unwrap();
        let store = DepStore::new(tmp.path());

        let plan = Planner::new(&graph, &store).plan(&goals(&["a"]));
        let err = plan.goals()[0].1.clone().unwrap_err();
        assert_eq!(
            err,
            PlanError::CircularDependency {
                cycle: goals(&["a", "b", "c", "a"])
            }
        );
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> c -> a");
    }

    #[test]
    fn test_cycle_through_lazy_prereq() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", "%.o: %.c, %.d\n%.h: %.o\n").unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);
        store.write("a.d", &goals(&["a.h"])).unwrap();

        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        assert!(matches!(
            plan.goals()[0].1,
            Err(PlanError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_missing_intermediate_is_deferred_until_needed() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse(
            "Rulefile",
            "prog: a.o\n%.o: %.c\n%.c: %.y action: yacc $< -o $@\n",
        )
        .unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.y", "", 100);
        write_at(&tmp, "a.o", "", 50);
        write_at(&tmp, "prog", "", 40);

        let plan = Planner::new(&graph, &store).plan(&goals(&["prog"]));
        assert_eq!(plan.get("a.c").unwrap().state, NodeState::Deferred);
        assert_eq!(plan.get("a.o").unwrap().state, NodeState::UpToDate);
        assert_eq!(plan.get("prog").unwrap().state, NodeState::UpToDate);

        // A newer grammar reaches through the missing intermediate.
        write_at(&tmp, "a.y", "", 1);
        let plan = Planner::new(&graph, &store).plan(&goals(&["prog"]));
        assert_eq!(plan.get("a.c").unwrap().state, NodeState::Queued);
        assert_eq!(plan.get("a.o").unwrap().state, NodeState::Queued);
        assert_eq!(plan.build_order().len(), 3);
    }

    #[test]
    fn test_pattern_rule_needs_makeable_prereqs() {
        let tmp = TempDir::new().unwrap();
        let mut graph = TargetGraph::new();
        graph.declare_rule(Pattern::parse("%.o").unwrap(), goals(&["%.cpp"]), None, None);
        graph.declare_rule(Pattern::parse("%.o").unwrap(), goals(&["%.c"]), None, None);
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "a.c", "", 100);

        let plan = Planner::new(&graph, &store).plan(&goals(&["a.o"]));
        assert_eq!(plan.get("a.o").unwrap().static_prereqs, goals(&["a.c"]));

        let plan = Planner::new(&graph, &store).plan(&goals(&["b.o"]));
        assert_eq!(
            plan.goals()[0].1,
            Err(PlanError::NoRuleFound {
                target: "b.cpp".to_string(),
                needed_by: Some("b.o".to_string()),
            })
        );
    }

    #[test]
    fn test_phony_is_always_queued() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", ".PHONY: clean\nclean: action: rm -f *.o\n").unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "clean", "", 10);

        let plan = Planner::new(&graph, &store).plan(&goals(&["clean"]));
        assert_eq!(plan.get("clean").unwrap().reason, Some(StaleReason::Phony));
    }

    #[test]
    fn test_content_mode_ignores_touch() {
        let tmp = TempDir::new().unwrap();
        let graph = rulefile::parse("Rulefile", "out: in action: cp in out\n").unwrap();
        let store = DepStore::new(tmp.path());
        write_at(&tmp, "in", "data", 100);
        write_at(&tmp, "out", "data", 50);

        let mut cache = FingerprintCache::default();
        let fp = ActionFingerprint::compute(tmp.path(), &goals(&["cp in out"]), &goals(&["in"]))
            .unwrap();
        cache.update("out".to_string(), fp);

        write_at(&tmp, "in", "data", 10);
        let plan = Planner::new(&graph, &store)
            .freshness(Freshness::Content)
            .fingerprints(&cache)
            .plan(&goals(&["out"]));
        assert_eq!(plan.get("out").unwrap().state, NodeState::UpToDate);

        let plan = Planner::new(&graph, &store).plan(&goals(&["out"]));
        assert_eq!(plan.get("out").unwrap().state, NodeState::Queued);

        write_at(&tmp, "in", "changed", 100);
        let plan = Planner::new(&graph, &store)
            .freshness(Freshness::Content)
            .fingerprints(&cache)
            .plan(&goals(&["out"]));
        assert_eq!(
            plan.get("out").unwrap().reason,
            Some(StaleReason::FingerprintChanged)
        );
    }

    #[test]
    fn test_merge_prereqs() {
        assert_eq!(
            merge_prereqs("a.o", &goals(&["a.c", "a.h"]), &goals(&["a.h", "a.o", "b.h"])),
            goals(&["a.c", "a.h", "b.h"])
        );
    }
}
