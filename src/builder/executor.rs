//! Build executor with progress reporting.
//!
//! Queued nodes run on a rayon pool as soon as every queued prerequisite
//! has been built. Results come back over a channel to the scheduling
//! loop, which is the only place plan state is mutated.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use petgraph::graph::NodeIndex;

use crate::builder::fingerprint::ActionFingerprint;
use crate::builder::plan::{merge_prereqs, NodeState, Plan, PlanNode, SkipCause};
use crate::builder::runner::{ActionError, ActionRunner, Job};
use crate::depfile::store::{DepStore, IngestError};
use crate::util::fs::{mtime, remove_file_if_exists};

/// What happened while running one action.
#[derive(Debug)]
struct Completion {
    result: Result<(), ActionError>,
    /// Whether a dependency record was created that did not exist before
    record_created: bool,
    fingerprint: Option<ActionFingerprint>,
}

/// Summary of an executed plan.
#[derive(Debug, Default)]
pub struct ExecSummary {
    /// Targets whose action ran successfully, in completion order
    pub built: Vec<String>,
    /// Targets whose action failed, with the reason
    pub failed: Vec<(String, String)>,
    /// Queued targets that never ran
    pub skipped: Vec<String>,
    /// Records that did not exist before this run and were written by it
    pub records_created: Vec<String>,
    /// Fingerprints of successful actions, for `Freshness::Content`
    pub fingerprints: Vec<(String, ActionFingerprint)>,
    pub elapsed: Duration,
}

impl ExecSummary {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Build executor with progress tracking.
pub struct Executor {
    runner: Arc<dyn ActionRunner>,
    store: DepStore,
    jobs: usize,
    keep_going: bool,
    fingerprint: bool,
    progress: bool,
}

impl Executor {
    /// Create a new executor running actions in the store's root.
    pub fn new(runner: Arc<dyn ActionRunner>, store: DepStore) -> Self {
        Executor {
            runner,
            store,
            jobs: 1,
            keep_going: true,
            fingerprint: false,
            progress: false,
        }
    }

    /// Maximum number of actions in flight.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Keep building unrelated targets after a failure.
    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Record content fingerprints of successful actions.
    pub fn fingerprint(mut self, fingerprint: bool) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Show a progress bar.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn root(&self) -> &Path {
        self.store.root()
    }

    /// Run every queued node of the plan.
    pub fn execute(&self, plan: &mut Plan) -> Result<ExecSummary> {
        let start = Instant::now();
        let mut summary = ExecSummary::default();

        let order = plan.build_order();
        let mut pending: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready = VecDeque::new();
        for &idx in &order {
            let waiting = plan
                .prereqs_of(idx)
                .filter(|&p| plan.node(p).state == NodeState::Queued)
                .count();
            if waiting == 0 {
                ready.push_back(idx);
            }
            pending.insert(idx, waiting);
        }
        // Start in discovery order, so goals run in the order given.
        ready.make_contiguous().sort();

        let total = plan.action_count();
        let pb = if self.progress && total > 1 {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .context("invalid progress template")?
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .context("failed to create thread pool")?;
        let (tx, rx) = mpsc::channel::<(NodeIndex, Completion)>();
        let mut in_flight = 0usize;
        let mut stopped = false;

        loop {
            while !stopped && in_flight < self.jobs {
                let Some(idx) = ready.pop_front() else {
                    break;
                };

                if plan.node(idx).action.is_none() {
                    tracing::trace!("`{}` has no action", plan.node(idx).name);
                    plan.node_mut(idx).state = NodeState::Built;
                    release(plan, idx, &mut pending, &mut ready);
                    continue;
                }

                let node = plan.node(idx).clone();
                if let Some(ref pb) = pb {
                    pb.set_message(node.name.clone());
                }
                plan.node_mut(idx).state = NodeState::Building;

                let work = Work {
                    node,
                    root: self.root().to_path_buf(),
                    store: self.store.clone(),
                    fingerprint: self.fingerprint,
                };
                let runner = Arc::clone(&self.runner);
                let tx = tx.clone();
                pool.spawn(move || {
                    let completion = work.run(runner.as_ref());
                    let _ = tx.send((idx, completion));
                });
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let (idx, completion) = rx
                .recv()
                .context("build worker disconnected unexpectedly")?;
            in_flight -= 1;
            if let Some(ref pb) = pb {
                pb.inc(1);
            }

            let name = plan.node(idx).name.clone();
            match completion.result {
                Ok(()) => {
                    plan.node_mut(idx).state = NodeState::Built;
                    if completion.record_created {
                        if let Some(record) = plan.node(idx).record() {
                            summary.records_created.push(record.to_string());
                        }
                    }
                    if let Some(fp) = completion.fingerprint {
                        summary.fingerprints.push((name.clone(), fp));
                    }
                    summary.built.push(name);
                    release(plan, idx, &mut pending, &mut ready);
                }
                Err(e) => {
                    tracing::error!("building `{}` failed: {}", name, e);
                    let message = e.to_string();
                    plan.node_mut(idx).state = NodeState::Failed(message.clone());
                    summary.failed.push((name.clone(), message));
                    skip_dependents(plan, idx, &name);
                    if !self.keep_going {
                        tracing::debug!("stopping after failure of `{}`", name);
                        stopped = true;
                    }
                }
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        for idx in order {
            let node = plan.node_mut(idx);
            match node.state {
                NodeState::Queued => {
                    node.state = NodeState::Skipped(SkipCause::Cancelled);
                    summary.skipped.push(node.name.clone());
                }
                NodeState::Skipped(_) => summary.skipped.push(node.name.clone()),
                _ => {}
            }
        }

        summary.elapsed = start.elapsed();
        tracing::debug!(
            "ran {} action(s), {} failed, {} skipped in {:.2}s",
            summary.built.len() + summary.failed.len(),
            summary.failed.len(),
            summary.skipped.len(),
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }
}

/// Mark a node's queued dependents as ready once nothing else blocks them.
fn release(
    plan: &Plan,
    idx: NodeIndex,
    pending: &mut HashMap<NodeIndex, usize>,
    ready: &mut VecDeque<NodeIndex>,
) {
    for dependent in plan.dependents_of(idx) {
        if plan.node(dependent).state != NodeState::Queued {
            continue;
        }
        if let Some(count) = pending.get_mut(&dependent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                ready.push_back(dependent);
            }
        }
    }
}

/// Skip everything downstream of a failed node.
fn skip_dependents(plan: &mut Plan, failed: NodeIndex, name: &str) {
    let mut stack = vec![failed];
    while let Some(current) = stack.pop() {
        let dependents: Vec<NodeIndex> = plan
            .dependents_of(current)
            .filter(|&d| plan.node(d).state == NodeState::Queued)
            .collect();
        for d in dependents {
            tracing::debug!("skipping `{}`: `{}` failed", plan.node(d).name, name);
            plan.node_mut(d).state = NodeState::Skipped(SkipCause::UpstreamFailed(name.to_string()));
            stack.push(d);
        }
    }
}

/// One action, owned so it can move to a worker thread.
struct Work {
    node: PlanNode,
    root: PathBuf,
    store: DepStore,
    fingerprint: bool,
}

impl Work {
    fn run(self, runner: &dyn ActionRunner) -> Completion {
        let target = self.root.join(&self.node.name);
        let before = mtime(&target).ok().flatten();

        if let Some(depfile) = self.node.depfile() {
            if let Some(parent) = self.root.join(depfile).parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::debug!("could not create {}: {}", parent.display(), e);
                }
            }
        }

        let job = Job {
            target: self.node.name.clone(),
            commands: self.node.commands(),
            cwd: self.root.clone(),
        };
        tracing::debug!("building `{}`", job.target);

        if let Err(e) = runner.run(&job) {
            self.discard_outputs(&target, before);
            return Completion {
                result: Err(e),
                record_created: false,
                fingerprint: None,
            };
        }

        let (lazy, record_created) = self.ingest();
        let fingerprint = self.fingerprint.then(|| {
            let prereqs = merge_prereqs(&self.node.name, &self.node.static_prereqs, &lazy);
            let commands = self.node.commands_for(&prereqs);
            ActionFingerprint::compute(&self.root, &commands, &prereqs)
                .map_err(|e| tracing::debug!("cannot fingerprint `{}`: {:#}", self.node.name, e))
                .ok()
        });

        Completion {
            result: Ok(()),
            record_created,
            fingerprint: fingerprint.flatten(),
        }
    }

    /// Turn the raw artifact the action wrote into a record. Returns the
    /// prerequisites now on record and whether the record is new.
    fn ingest(&self) -> (Vec<String>, bool) {
        let Some(record) = self.node.record() else {
            return (Vec::new(), false);
        };
        let existed = self.store.resolve(record).exists();

        match self.store.ingest_raw(record, self.node.primary_source()) {
            Ok(prereqs) => (prereqs, !existed),
            Err(IngestError::Missing(raw)) => {
                tracing::warn!(
                    "`{}` did not write {}; it will be rebuilt next run",
                    self.node.name,
                    raw.display()
                );
                (Vec::new(), false)
            }
            Err(e) => {
                tracing::warn!("{}; `{}` will be rebuilt next run", e, self.node.name);
                (Vec::new(), false)
            }
        }
    }

    /// After a failed action, remove what it may have half-written.
    fn discard_outputs(&self, target: &Path, before: Option<std::time::SystemTime>) {
        let after = mtime(target).ok().flatten();
        if after.is_some() && after != before {
            match remove_file_if_exists(target) {
                Ok(true) => tracing::warn!("deleted `{}` after its action failed", self.node.name),
                Ok(false) => {}
                Err(e) => tracing::warn!("{:#}", e),
            }
        }
        if let Some(depfile) = self.node.depfile() {
            let _ = remove_file_if_exists(&self.root.join(depfile));
        }
    }
}
