//! Install command: resolve, build, and install packages plus their
//! dependency closure.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::info;

use crate::cmd::run_graph;
use crate::context::CliContext;
use crate::output;

pub fn cmd_install(ctx: &CliContext, packages: &[String]) -> Result<bool> {
    info!(packages = ?packages, "installing");

    let result = run_graph(ctx, packages, BTreeSet::new())?;
    output::print_outcome_summary(&result.outcomes, &result.versions);

    let ok = packages.iter().all(|name| {
        result
            .outcomes
            .get(name)
            .map(|o| o.is_success())
            .unwrap_or(false)
    });
    if !ok {
        output::print_error("Some packages were not installed");
    }
    Ok(ok)
}
