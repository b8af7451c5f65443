//! `lazymake build` command

use anyhow::{bail, Result};

use crate::cli::BuildArgs;
use lazymake::core::rulefile::RulefileError;
use lazymake::ops::{build, BuildError, BuildOptions, GoalStatus};
use lazymake::util::diagnostic::{emit, suggestions, Diagnostic};
use lazymake::util::context::RulefileLookupError;
use lazymake::util::GlobalContext;

pub fn execute(args: BuildArgs, verbose: bool, color: bool) -> Result<()> {
    let mut ctx = match args.directory {
        Some(ref dir) => GlobalContext::with_cwd(GlobalContext::new()?.cwd().join(dir)),
        None => GlobalContext::new()?,
    };
    ctx.set_verbose(verbose);
    ctx.set_color(color);

    let opts = BuildOptions {
        goals: args.goals.clone(),
        rulefile: args.rulefile.clone(),
        jobs: args.jobs,
        keep_going: args.keep_going(),
        freshness: args.freshness,
        dry_run: args.dry_run,
        verbose,
    };

    let report = match build(&ctx, &opts) {
        Ok(report) => report,
        Err(e) => return Err(report_setup_error(e, ctx.color())),
    };

    if args.dry_run {
        for command in &report.planned_commands {
            println!("{command}");
        }
    }

    let failed: Vec<_> = report.failed_goals().collect();
    if failed.is_empty() {
        if !args.dry_run {
            if report.actions_run == 0 {
                for goal in &report.goals {
                    eprintln!("lazymake: `{}` is up to date.", goal.goal);
                }
            } else {
                eprintln!(
                    "    Finished {} target(s) in {:.2}s",
                    report.actions_run,
                    report.elapsed_secs
                );
            }
        }
        return Ok(());
    }

    for result in &failed {
        let diag = match result.status {
            GoalStatus::Failed(ref reason) => {
                let diag = Diagnostic::error(format!("goal `{}` failed", result.goal))
                    .with_note(reason.clone());
                if reason.starts_with("no rule") {
                    let diag = diag.with_suggestion(suggestions::NO_RULE);
                    match report.rulefile {
                        Some(ref path) => diag.with_location(path.clone(), None),
                        None => diag,
                    }
                } else if reason.starts_with("dependency cycle") {
                    diag.with_suggestion(suggestions::CYCLE)
                } else if !ctx.is_verbose() {
                    diag.with_suggestion(suggestions::BUILD_FAILED)
                } else {
                    diag
                }
            }
            _ => Diagnostic::warning(format!(
                "goal `{}` was skipped after an earlier failure",
                result.goal
            )),
        };
        emit(&diag, ctx.color());
    }

    bail!("{} of {} goal(s) not built", failed.len(), report.goals.len())
}

/// Render errors raised before any planning happened.
fn report_setup_error(err: anyhow::Error, color: bool) -> anyhow::Error {
    let err = match err.downcast::<RulefileError>() {
        Ok(syntax) => {
            eprintln!("{:?}", miette::Report::new(syntax));
            return anyhow::anyhow!("could not parse the rule file");
        }
        Err(err) => err,
    };

    let missing = err.downcast_ref::<RulefileLookupError>().is_some()
        || matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::RulefileMissing(_))
        );
    if missing {
        let diag = Diagnostic::error(err.to_string()).with_suggestion(suggestions::NO_RULEFILE);
        emit(&diag, color);
        return anyhow::anyhow!("no rule file");
    }

    err
}
