//! Intermediate file removal.
//!
//! After a build, intermediates that did not exist before the run and were
//! created by it are deleted. Files that were already present are never
//! touched, and neither are goals.

use std::collections::HashSet;

use crate::builder::plan::{NodeState, Plan};
use crate::core::graph::TargetGraph;
use crate::core::intermediate::Provenance;
use crate::depfile::store::DepStore;
use crate::util::fs::remove_file_if_exists;

/// Delete intermediates created by this run. `records_created` lists the
/// dependency records written for the first time. Returns what was removed.
pub fn remove_intermediates(
    plan: &Plan,
    graph: &TargetGraph,
    store: &DepStore,
    records_created: &[String],
    goals: &[String],
) -> Vec<String> {
    let goals: HashSet<&str> = goals.iter().map(String::as_str).collect();
    let mut removed = Vec::new();

    for (_, node) in plan.nodes() {
        let created = node.state == NodeState::Built && node.mtime.is_none();
        if !created || !node.intermediate || node.phony || goals.contains(node.name.as_str()) {
            continue;
        }

        match remove_file_if_exists(&store.resolve(&node.name)) {
            Ok(true) => {
                tracing::debug!("removed intermediate `{}`", node.name);
                removed.push(node.name.clone());
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("{:#}", e),
        }
    }

    for record in records_created {
        let provenance = Provenance {
            via_pattern: false,
            is_record: true,
            is_goal: goals.contains(record.as_str()),
            mentioned: graph.mentioned_explicitly(record),
        };
        if graph.intermediate_policy().is_intermediate(record, provenance)
            && store.discard(record)
        {
            removed.push(record.clone());
        }
    }

    if !removed.is_empty() {
        tracing::info!("removed {} intermediate file(s)", removed.len());
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::executor::Executor;
    use crate::builder::plan::Planner;
    use crate::test_support::{BuildFixture, ScriptedRunner};
    use std::sync::Arc;

    fn goals(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn build(fx: &BuildFixture, rules: &str, runner: ScriptedRunner, wanted: &[&str]) -> Vec<String> {
        let graph = fx.graph(rules);
        let store = fx.store();
        let wanted = goals(wanted);
        let mut plan = Planner::new(&graph, &store).plan(&wanted);
        let summary = Executor::new(Arc::new(runner), store.clone())
            .execute(&mut plan)
            .unwrap();
        remove_intermediates(&plan, &graph, &store, &summary.records_created, &wanted)
    }

    const CHAIN: &str = "\
prog: a.o action: link
%.o: %.c, %.d action: cc
%.c: %.y action: yacc
";

    #[test]
    fn test_created_intermediates_are_removed() {
        let fx = BuildFixture::new();
        fx.source("a.y", "");
        let runner = ScriptedRunner::new().depfile("a.o", "a.Td", "a.o: a.c\n");

        let removed = build(&fx, CHAIN, runner, &["prog"]);

        assert_eq!(removed, goals(&["a.c", "a.d"]));
        assert!(fx.exists("prog"));
        assert!(fx.exists("a.o"));
        assert!(!fx.exists("a.c"));
    }

    #[test]
    fn test_not_intermediate_override_keeps_files() {
        let fx = BuildFixture::new();
        fx.source("a.y", "");
        let runner = ScriptedRunner::new().depfile("a.o", "a.Td", "a.o: a.c\n");
        let rules = format!("{CHAIN}.NOTINTERMEDIATE: %.d %.c\n");

        let removed = build(&fx, &rules, runner, &["prog"]);

        assert!(removed.is_empty());
        assert!(fx.exists("a.c"));
        assert!(fx.exists("a.d"));
    }

    #[test]
    fn test_goals_and_existing_files_are_kept() {
        let fx = BuildFixture::new();
        fx.source("a.y", "");
        fx.source("b.y", "");
        fx.write("b.c", "");
        fx.touch_future("b.y");

        let removed = build(&fx, CHAIN, ScriptedRunner::new(), &["a.c", "b.o"]);

        assert!(removed.is_empty());
        assert!(fx.exists("a.c"));
        assert!(fx.exists("b.c"));
    }
}
