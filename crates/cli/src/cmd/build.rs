//! Build command: build one package without installing it.
//!
//! Dependencies are still installed so their headers, libraries, and
//! binaries are available to the build.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::info;

use crate::cmd::run_graph;
use crate::context::CliContext;
use crate::output;

pub fn cmd_build(ctx: &CliContext, package: &str) -> Result<bool> {
    info!(package, "building");

    let roots = vec![package.to_string()];
    let build_only = BTreeSet::from([package.to_string()]);
    let result = run_graph(ctx, &roots, build_only)?;
    output::print_outcome_summary(&result.outcomes, &result.versions);

    let ok = result
        .outcomes
        .get(package)
        .map(|o| o.is_success())
        .unwrap_or(false);
    if !ok {
        output::print_error(&format!("Build of {} did not complete", package));
    }
    Ok(ok)
}
