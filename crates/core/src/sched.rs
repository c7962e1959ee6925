//! Build scheduling
//!
//! Walks the dependency graph in topological order, dispatching ready
//! packages (all dependencies terminal) to the executor, at most
//! `worker_limit` in flight. Completed-task events drive the
//! bookkeeping: each completion decrements its dependents' in-degree
//! counts and newly ready nodes enter the ready set. Among ready nodes
//! dispatch order is lexical by package name, so scheduling is
//! reproducible; completion order across independent subgraphs is not.
//!
//! A package failure never aborts the run: its transitive dependents
//! are marked `Skipped` and independent subgraphs continue to
//! completion. Before dispatching, the scheduler consults the build
//! cache and ledger; a satisfied node completes as a cached success
//! with no executor invocation at all.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use kiln_platform::KilnPaths;

use crate::cache::CacheKey;
use crate::cancel::CancelToken;
use crate::executor::{ExecTask, PackageExecutor};
use crate::fingerprint::compute_fingerprints;
use crate::graph::DependencyGraph;
use crate::state::StateStore;

/// Terminal state of one package in a scheduling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Built (or, with `cached`, found already satisfied on disk).
    Success { cached: bool },
    /// Never attempted because a dependency failed.
    Skipped { failed_dependency: String },
    /// The pipeline failed at `stage`.
    Failed { stage: String, reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Coordinates one scheduling run; workers only execute, the
/// scheduler alone decides readiness.
pub struct Scheduler {
    worker_limit: usize,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(worker_limit: usize, cancel: CancelToken) -> Self {
        Self {
            worker_limit: worker_limit.max(1),
            cancel,
        }
    }

    /// Run the full graph to termination and report every package's
    /// outcome. Individual package failures land in the result map,
    /// never abort the run.
    ///
    /// Packages named in `build_only` stop after their build stage
    /// (no install steps, no ledger entry).
    pub async fn run(
        &self,
        graph: &DependencyGraph<'_>,
        executor: Arc<dyn PackageExecutor>,
        state: Arc<Mutex<StateStore>>,
        paths: &KilnPaths,
        build_only: &BTreeSet<String>,
    ) -> BTreeMap<String, Outcome> {
        let n = graph.len();
        let fingerprints = compute_fingerprints(graph);

        // In-degree here counts unresolved dependencies; dependents is
        // the reverse adjacency used to unlock them.
        let mut indegree: Vec<usize> = (0..n).map(|i| graph.node(i).deps.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            for &d in &graph.node(i).deps {
                dependents[d].push(i);
            }
        }

        let mut ready: BTreeSet<String> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(|i| graph.node(i).manifest.name.clone())
            .collect();
        let mut outcomes: BTreeMap<String, Outcome> = BTreeMap::new();
        let mut inflight: JoinSet<(usize, Result<(), crate::error::ExecError>)> = JoinSet::new();
        let mut running = 0usize;
        let mut done = 0usize;

        info!(packages = n, workers = self.worker_limit, "scheduling");

        while done < n {
            // Dispatch as many ready nodes as the worker limit allows.
            while running < self.worker_limit && !self.cancel.is_cancelled() {
                let Some(name) = ready.iter().next().cloned() else {
                    break;
                };
                ready.remove(&name);
                let i = graph.index_of(&name).expect("ready node is in graph");
                let node = graph.node(i);

                // A failed or skipped dependency poisons this node.
                let failed_dep = node.deps.iter().find_map(|&d| {
                    let dep_name = &graph.node(d).manifest.name;
                    match outcomes.get(dep_name) {
                        Some(Outcome::Failed { .. }) => Some(dep_name.clone()),
                        Some(Outcome::Skipped { failed_dependency }) => {
                            Some(failed_dependency.clone())
                        }
                        _ => None,
                    }
                });
                if let Some(failed_dependency) = failed_dep {
                    debug!(package = %name, cause = %failed_dependency, "skipped");
                    outcomes.insert(name, Outcome::Skipped { failed_dependency });
                    done += 1;
                    release(i, &mut indegree, &dependents, graph, &mut ready);
                    continue;
                }

                let key = CacheKey::new(
                    &node.manifest.name,
                    &node.manifest.version,
                    &fingerprints[&node.manifest.name],
                );
                let build_only_node = build_only.contains(&name);

                // Cache consultation: an intact prior install (or, for
                // build-only nodes, a present artifact) is a cached
                // success with no executor call. An install node with
                // only the build satisfied still dispatches, but the
                // executor reuses the artifact instead of rebuilding.
                let (satisfied, reuse_build) = {
                    let st = state.lock().unwrap();
                    if build_only_node {
                        (st.build_satisfied(&key), false)
                    } else {
                        (st.install_satisfied(&key), st.build_satisfied(&key))
                    }
                };
                if satisfied {
                    debug!(package = %name, "up to date");
                    outcomes.insert(name, Outcome::Success { cached: true });
                    done += 1;
                    release(i, &mut indegree, &dependents, graph, &mut ready);
                    continue;
                }

                let dep_prefixes = node
                    .deps
                    .iter()
                    .map(|&d| {
                        let dep = graph.node(d).manifest;
                        paths.prefix_dir(&dep.name, &dep.version, &fingerprints[&dep.name])
                    })
                    .collect();
                let task = ExecTask {
                    manifest: node.manifest.clone(),
                    key,
                    dep_prefixes,
                    install: !build_only_node,
                    reuse_build,
                };

                debug!(package = %name, "dispatching");
                let exec = executor.clone();
                inflight.spawn(async move { (i, exec.execute(task).await.map(|_| ())) });
                running += 1;
            }

            if done >= n || running == 0 {
                break;
            }

            // Wait for one completion event; it may unlock dependents.
            match inflight.join_next().await {
                Some(Ok((i, result))) => {
                    running -= 1;
                    let name = graph.node(i).manifest.name.clone();
                    let outcome = match result {
                        Ok(()) => Outcome::Success { cached: false },
                        Err(e) => Outcome::Failed {
                            stage: e.stage().to_string(),
                            reason: e.to_string(),
                        },
                    };
                    debug!(package = %name, ?outcome, "completed");
                    outcomes.insert(name, outcome);
                    done += 1;
                    release(i, &mut indegree, &dependents, graph, &mut ready);
                }
                Some(Err(join_err)) => {
                    // A worker panicked; its node stays unresolved and
                    // is reported below.
                    error!(error = %join_err, "executor task aborted");
                    running -= 1;
                }
                None => break,
            }
        }

        // Anything unresolved at this point was overtaken by
        // cancellation (or a worker panic).
        for i in 0..n {
            let name = &graph.node(i).manifest.name;
            if !outcomes.contains_key(name) {
                outcomes.insert(
                    name.clone(),
                    Outcome::Failed {
                        stage: "cancelled".to_string(),
                        reason: "invocation cancelled".to_string(),
                    },
                );
            }
        }

        outcomes
    }
}

/// A node reached a terminal state: unlock its dependents.
fn release(
    i: usize,
    indegree: &mut [usize],
    dependents: &[Vec<usize>],
    graph: &DependencyGraph<'_>,
    ready: &mut BTreeSet<String>,
) {
    for &dep_idx in &dependents[i] {
        indegree[dep_idx] -= 1;
        if indegree[dep_idx] == 0 {
            ready.insert(graph.node(dep_idx).manifest.name.clone());
        }
    }
}
