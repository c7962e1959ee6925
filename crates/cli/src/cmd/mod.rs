//! Command implementations for the kiln CLI.

mod build;
mod install;
mod list;
mod uninstall;

pub use build::cmd_build;
pub use install::cmd_install;
pub use list::cmd_list;
pub use uninstall::cmd_uninstall;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use kiln_core::{
    CancelToken, DefaultFetcher, DependencyGraph, DirRegistry, Executor, ManifestStore, Outcome,
    Scheduler, StateStore,
};

use crate::context::CliContext;

/// Result of a scheduler run: per-package outcomes plus the resolved
/// version of every package in the graph, for the summary printer.
pub(crate) struct RunResult {
    pub outcomes: BTreeMap<String, Outcome>,
    pub versions: BTreeMap<String, String>,
}

/// Resolve the graph rooted at `roots` and run it to completion.
///
/// Packages named in `build_only` stop after their build stage. A
/// ctrl-c handler trips the shared cancel token so in-flight builds
/// are torn down and rolled back instead of orphaned.
pub(crate) fn run_graph(
    ctx: &CliContext,
    roots: &[String],
    build_only: BTreeSet<String>,
) -> Result<RunResult> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    let mut store = ManifestStore::new(Box::new(DirRegistry::new(&ctx.registry)));
    let graph = DependencyGraph::build(&mut store, roots)?;
    debug!(packages = graph.len(), "dependency graph resolved");

    let state = Arc::new(Mutex::new(StateStore::load(&ctx.paths)?));
    let cancel = CancelToken::new();

    let versions: BTreeMap<String, String> = (0..graph.len())
        .map(|i| {
            let m = graph.node(i).manifest;
            (m.name.clone(), m.version.clone())
        })
        .collect();

    let outcomes = runtime.block_on(async {
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling remaining work");
                ctrl_c_cancel.cancel();
            }
        });

        let executor = Arc::new(Executor::new(
            ctx.paths.clone(),
            state.clone(),
            Arc::new(DefaultFetcher),
            cancel.clone(),
        ));
        let scheduler = Scheduler::new(ctx.jobs, cancel);
        scheduler
            .run(&graph, executor, state.clone(), &ctx.paths, &build_only)
            .await
    });

    Ok(RunResult { outcomes, versions })
}
