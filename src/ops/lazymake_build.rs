//! Implementation of `lazymake build`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::builder::cleanup::remove_intermediates;
use crate::builder::executor::Executor;
use crate::builder::fingerprint::FingerprintCache;
use crate::builder::freshness::Freshness;
use crate::builder::plan::{NodeState, Plan, Planner, SkipCause};
use crate::builder::runner::{ActionRunner, ShellRunner};
use crate::core::graph::TargetGraph;
use crate::core::rulefile;
use crate::depfile::store::DepStore;
use crate::util::config::{load_config, Config};
use crate::util::context::{GlobalContext, DEFAULT_RULEFILE};

/// Errors that prevent a build from starting.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no goals given and {} declares no default target", .0.display())]
    NoGoal(PathBuf),

    #[error("rule file {} does not exist", .0.display())]
    RulefileMissing(PathBuf),
}

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Goals to build (empty = the default goal)
    pub goals: Vec<String>,

    /// Explicit rule file, relative to the working directory
    pub rulefile: Option<PathBuf>,

    /// Number of parallel jobs
    pub jobs: Option<usize>,

    /// Keep going after a failure (None = config, then true)
    pub keep_going: Option<bool>,

    /// Staleness check mode
    pub freshness: Option<Freshness>,

    /// Print the commands that would run without running them
    pub dry_run: bool,

    /// Verbose output
    pub verbose: bool,
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub jobs: usize,
    pub keep_going: bool,
    pub freshness: Freshness,
    pub progress: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings {
            jobs: default_jobs(),
            keep_going: true,
            freshness: Freshness::Mtime,
            progress: false,
        }
    }
}

impl BuildSettings {
    /// Combine command-line options with configuration. Options win.
    pub fn resolve(opts: &BuildOptions, config: &Config) -> Self {
        BuildSettings {
            jobs: opts.jobs.or(config.build.jobs).unwrap_or_else(default_jobs),
            keep_going: opts.keep_going.or(config.build.keep_going).unwrap_or(true),
            freshness: opts
                .freshness
                .or_else(|| config.freshness())
                .unwrap_or_default(),
            progress: !opts.verbose,
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Outcome of one goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalStatus {
    Success,
    Failed(String),
    /// Not attempted because the build stopped after another failure
    Skipped,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStatus::Success => write!(f, "success"),
            GoalStatus::Failed(reason) => write!(f, "failed: {reason}"),
            GoalStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result for one requested goal.
#[derive(Debug, Clone)]
pub struct GoalResult {
    pub goal: String,
    pub status: GoalStatus,
}

/// Result of a build.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Per-goal outcomes, in request order
    pub goals: Vec<GoalResult>,
    /// Targets whose action ran successfully
    pub built: Vec<String>,
    /// Number of actions started
    pub actions_run: usize,
    /// Intermediate files deleted after the build
    pub removed: Vec<String>,
    /// Lazy provider invocations per target
    pub provider_calls: BTreeMap<String, usize>,
    /// Commands that would run, for dry runs
    pub planned_commands: Vec<String>,
    /// Rule file the goals were read from
    pub rulefile: Option<PathBuf>,
    pub elapsed_secs: f64,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.goals.iter().all(|g| g.status == GoalStatus::Success)
    }

    pub fn failed_goals(&self) -> impl Iterator<Item = &GoalResult> {
        self.goals
            .iter()
            .filter(|g| g.status != GoalStatus::Success)
    }
}

/// Locate the Rulefile, load configuration and build the requested goals.
pub fn build(ctx: &GlobalContext, opts: &BuildOptions) -> Result<BuildReport> {
    let global = Config::load_or_default(&ctx.config_path());

    let rulefile_path = match opts.rulefile {
        Some(ref path) => {
            let path = ctx.cwd().join(path);
            if !path.is_file() {
                return Err(BuildError::RulefileMissing(path).into());
            }
            path
        }
        None => {
            let name = global.build.rulefile.as_deref().unwrap_or(DEFAULT_RULEFILE);
            ctx.find_rulefile(name)?
        }
    };
    let root = rulefile_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.cwd().to_path_buf());

    let config = load_config(
        &ctx.config_path(),
        &GlobalContext::project_config_path(&root),
    );
    let graph = rulefile::load(&rulefile_path)?;

    let goals = if opts.goals.is_empty() {
        let goal = graph
            .default_goal()
            .ok_or_else(|| BuildError::NoGoal(rulefile_path.clone()))?;
        vec![goal.to_string()]
    } else {
        opts.goals.clone()
    };

    let settings = BuildSettings::resolve(opts, &config);
    tracing::debug!(
        "building {} in {} (jobs={}, keep_going={}, freshness={})",
        goals.join(" "),
        root.display(),
        settings.jobs,
        settings.keep_going,
        settings.freshness
    );

    let mut report = if opts.dry_run {
        dry_run(&graph, &root, &goals, &settings)?
    } else {
        let runner = Arc::new(ShellRunner::new(opts.verbose));
        run_build(&graph, &root, &goals, runner, &settings)?
    };
    report.rulefile = Some(rulefile_path);
    Ok(report)
}

/// Build goals of an already loaded graph in `root`.
pub fn run_build(
    graph: &TargetGraph,
    root: &Path,
    goals: &[String],
    runner: Arc<dyn ActionRunner>,
    settings: &BuildSettings,
) -> Result<BuildReport> {
    let store = DepStore::new(root);
    let content = settings.freshness == Freshness::Content;
    let fp_path = GlobalContext::fingerprint_path(root);
    let mut cache = if content {
        FingerprintCache::load_or_default(&fp_path)
    } else {
        FingerprintCache::default()
    };

    let mut plan = Planner::new(graph, &store)
        .freshness(settings.freshness)
        .fingerprints(&cache)
        .plan(goals);

    let summary = Executor::new(runner, store.clone())
        .jobs(settings.jobs)
        .keep_going(settings.keep_going)
        .fingerprint(content)
        .progress(settings.progress)
        .execute(&mut plan)?;

    if content {
        for (target, fp) in summary.fingerprints.iter().cloned() {
            cache.update(target, fp);
        }
        for (target, _) in &summary.failed {
            cache.forget(target);
        }
        cache
            .save(&fp_path)
            .with_context(|| format!("failed to save {}", fp_path.display()))?;
    }

    let removed = remove_intermediates(&plan, graph, &store, &summary.records_created, goals);

    Ok(BuildReport {
        goals: goal_results(&plan),
        actions_run: summary.built.len() + summary.failed.len(),
        built: summary.built,
        removed,
        provider_calls: plan.provider_calls().clone(),
        planned_commands: Vec::new(),
        rulefile: None,
        elapsed_secs: summary.elapsed.as_secs_f64(),
    })
}

/// Plan without running anything; report the commands that would run.
pub fn dry_run(
    graph: &TargetGraph,
    root: &Path,
    goals: &[String],
    settings: &BuildSettings,
) -> Result<BuildReport> {
    let store = DepStore::new(root);
    let cache = if settings.freshness == Freshness::Content {
        FingerprintCache::load_or_default(&GlobalContext::fingerprint_path(root))
    } else {
        FingerprintCache::default()
    };
    let plan = Planner::new(graph, &store)
        .freshness(settings.freshness)
        .fingerprints(&cache)
        .plan(goals);

    let planned_commands = plan
        .build_order()
        .into_iter()
        .flat_map(|idx| plan.node(idx).commands())
        .collect();

    Ok(BuildReport {
        goals: goal_results(&plan),
        provider_calls: plan.provider_calls().clone(),
        planned_commands,
        ..BuildReport::default()
    })
}

fn goal_results(plan: &Plan) -> Vec<GoalResult> {
    plan.goals()
        .iter()
        .map(|(goal, planned)| {
            let status = match planned {
                Err(e) => GoalStatus::Failed(e.to_string()),
                Ok(idx) => match &plan.node(*idx).state {
                    NodeState::Failed(reason) => GoalStatus::Failed(reason.clone()),
                    NodeState::Skipped(SkipCause::UpstreamFailed(prereq)) => {
                        GoalStatus::Failed(format!("prerequisite `{prereq}` failed"))
                    }
                    NodeState::Skipped(SkipCause::Cancelled) => GoalStatus::Skipped,
                    NodeState::PlanFailed(e) => GoalStatus::Failed(e.to_string()),
                    _ => GoalStatus::Success,
                },
            };
            GoalResult {
                goal: goal.clone(),
                status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{BuildFixture, ScriptedRunner};

    fn goals(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn settings() -> BuildSettings {
        BuildSettings {
            jobs: 2,
            ..BuildSettings::default()
        }
    }

    const OBJECTS: &str = "\
%.o: %.c, %.d action: cc -MMD -MF $(DEPFILE) -c $< -o $@
.NOTINTERMEDIATE: %.d %.h
";

    fn objects() -> BuildFixture {
        let fx = BuildFixture::new();
        fx.source("a.c", "#include \"a.h\"\n")
            .source("a.h", "")
            .source("b.c", "#include \"b.h\"\n")
            .source("b.h", "");
        fx
    }

    fn compiler() -> ScriptedRunner {
        ScriptedRunner::new()
            .depfile("a.o", "a.Td", "a.o: a.c a.h\n")
            .depfile("b.o", "b.Td", "b.o: b.c b.h\n")
    }

    #[test]
    fn test_only_reachable_provider_is_invoked() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);
        fx.write("b.d", "b.h\n");

        let report = run_build(
            &graph,
            fx.root(),
            &goals(&["a.o"]),
            Arc::new(compiler()),
            &settings(),
        )
        .unwrap();

        assert!(report.success());
        assert_eq!(report.provider_calls.get("a.o"), Some(&1));
        assert!(!report.provider_calls.contains_key("b.o"));
        assert_eq!(fx.read("b.d"), "b.h\n");
        assert!(!fx.exists("b.o"));
    }

    #[test]
    fn test_second_run_does_nothing() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);
        let wanted = goals(&["a.o", "b.o"]);

        let first = run_build(&graph, fx.root(), &wanted, Arc::new(compiler()), &settings()).unwrap();
        assert_eq!(first.actions_run, 2);
        assert_eq!(fx.read("a.d"), "a.h\n");

        let runner = Arc::new(compiler());
        let second = run_build(&graph, fx.root(), &wanted, runner.clone(), &settings()).unwrap();
        assert!(second.success());
        assert_eq!(second.actions_run, 0);
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_modified_header_rebuilds_its_object() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);
        let wanted = goals(&["a.o", "b.o"]);
        run_build(&graph, fx.root(), &wanted, Arc::new(compiler()), &settings()).unwrap();

        fx.touch_future("a.h");
        let runner = Arc::new(compiler());
        let report = run_build(&graph, fx.root(), &wanted, runner.clone(), &settings()).unwrap();

        assert!(report.success());
        assert_eq!(runner.targets(), goals(&["a.o"]));
    }

    #[test]
    fn test_not_intermediate_records_survive() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);
        run_build(&graph, fx.root(), &goals(&["a.o"]), Arc::new(compiler()), &settings()).unwrap();
        assert!(fx.exists("a.d"));

        // Without the override the record is scratch output.
        let fx = objects();
        let graph = fx.graph("%.o: %.c, %.d action: cc\n");
        let report =
            run_build(&graph, fx.root(), &goals(&["a.o"]), Arc::new(compiler()), &settings()).unwrap();
        assert_eq!(report.removed, goals(&["a.d"]));
        assert!(fx.exists("a.o"));
    }

    const GENERATED: &str = "\
%.o: %.c %.h, %.d action: cc -MMD -MF $(DEPFILE) -c $< -o $@
%.h: %.in action: gen $< > $@
";

    fn generated() -> (BuildFixture, ScriptedRunner) {
        let fx = BuildFixture::new();
        fx.source("g.c", "#include \"g.h\"\n").source("g.in", "");
        let runner = ScriptedRunner::new().depfile("g.o", "g.Td", "g.o: g.c g.h\n");
        (fx, runner)
    }

    #[test]
    fn test_not_intermediate_generated_header_survives() {
        let (fx, runner) = generated();
        let graph = fx.graph(&format!("{GENERATED}.NOTINTERMEDIATE: %.d %.h\n"));
        let report =
            run_build(&graph, fx.root(), &goals(&["g.o"]), Arc::new(runner), &settings()).unwrap();

        assert!(report.success());
        assert!(report.built.contains(&"g.h".to_string()));
        assert!(report.removed.is_empty());
        assert!(fx.exists("g.h"));
        assert!(fx.exists("g.d"));
    }

    #[test]
    fn test_generated_header_is_removed_by_default() {
        let (fx, runner) = generated();
        let graph = fx.graph(GENERATED);
        let report =
            run_build(&graph, fx.root(), &goals(&["g.o"]), Arc::new(runner), &settings()).unwrap();

        assert!(report.success());
        assert_eq!(report.removed, goals(&["g.h", "g.d"]));
        assert!(!fx.exists("g.h"));
        assert!(!fx.exists("g.d"));
        assert!(fx.exists("g.o"));
    }

    #[test]
    fn test_malformed_record_rebuilds_without_failing() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);
        let wanted = goals(&["a.o"]);
        run_build(&graph, fx.root(), &wanted, Arc::new(compiler()), &settings()).unwrap();

        fx.write("a.d", "");
        let runner = Arc::new(compiler());
        let report = run_build(&graph, fx.root(), &wanted, runner.clone(), &settings()).unwrap();

        assert!(report.success());
        assert_eq!(runner.targets(), goals(&["a.o"]));
        assert_eq!(fx.read("a.d"), "a.h\n");
    }

    #[test]
    fn test_phony_goal_next_to_file_goal() {
        let fx = BuildFixture::new();
        fx.source("a.src", "");
        let graph = fx.graph(
            "%.tsk: %.src, %.dep action: run $<\ninstall: action: echo install\n.PHONY: install\n",
        );

        let report = run_build(
            &graph,
            fx.root(),
            &goals(&["a.tsk", "install"]),
            Arc::new(ScriptedRunner::new().depfile("a.tsk", "a.Td", "a.tsk: a.src\n")),
            &settings(),
        )
        .unwrap();

        assert!(report.success());
        assert_eq!(report.provider_calls.get("a.tsk"), Some(&1));
        assert_eq!(report.provider_calls.get("install"), None);
        assert_eq!(report.goals.len(), 2);
    }

    #[test]
    fn test_no_rule_goal_does_not_abort_other_goals() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);

        let report = run_build(
            &graph,
            fx.root(),
            &goals(&["nothing.o", "a.o"]),
            Arc::new(compiler()),
            &settings(),
        )
        .unwrap();

        assert!(!report.success());
        assert_eq!(
            report.goals[0].status,
            GoalStatus::Failed(
                "no rule to make target `nothing.c`, needed by `nothing.o`".to_string()
            )
        );
        assert_eq!(report.goals[1].status, GoalStatus::Success);
        assert!(fx.exists("a.o"));
    }

    #[test]
    fn test_stop_mode_skips_sibling_goals() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);
        let stop = BuildSettings {
            jobs: 1,
            keep_going: false,
            ..settings()
        };

        let report = run_build(
            &graph,
            fx.root(),
            &goals(&["a.o", "b.o"]),
            Arc::new(compiler().fail("a.o")),
            &stop,
        )
        .unwrap();

        assert!(matches!(report.goals[0].status, GoalStatus::Failed(_)));
        assert_eq!(report.goals[1].status, GoalStatus::Skipped);
        assert!(!fx.exists("a.o"));
        assert!(!fx.exists("b.o"));
    }

    #[test]
    fn test_content_mode_survives_touch() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);
        let content = BuildSettings {
            freshness: Freshness::Content,
            ..settings()
        };
        let wanted = goals(&["a.o"]);
        run_build(&graph, fx.root(), &wanted, Arc::new(compiler()), &content).unwrap();
        assert!(fx.exists(".lazymake/fingerprints.json"));

        fx.touch_future("a.h");
        let runner = Arc::new(compiler());
        run_build(&graph, fx.root(), &wanted, runner.clone(), &content).unwrap();
        assert_eq!(runner.call_count(), 0);

        fx.write("a.h", "#define CHANGED\n");
        let runner = Arc::new(compiler());
        run_build(&graph, fx.root(), &wanted, runner.clone(), &content).unwrap();
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn test_dry_run_lists_commands_only() {
        let fx = objects();
        let graph = fx.graph(OBJECTS);

        let report = dry_run(&graph, fx.root(), &goals(&["a.o"]), &settings()).unwrap();
        assert_eq!(
            report.planned_commands,
            vec!["cc -MMD -MF a.Td -c a.c -o a.o".to_string()]
        );
        assert!(!fx.exists("a.o"));
    }

    #[test]
    fn test_settings_prefer_options_over_config() {
        let mut config = Config::default();
        config.build.jobs = Some(3);
        config.build.keep_going = Some(false);
        config.build.freshness = Some("content".to_string());

        let opts = BuildOptions {
            jobs: Some(8),
            ..BuildOptions::default()
        };
        let settings = BuildSettings::resolve(&opts, &config);
        assert_eq!(settings.jobs, 8);
        assert!(!settings.keep_going);
        assert_eq!(settings.freshness, Freshness::Content);
    }
}
