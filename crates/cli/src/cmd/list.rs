//! List command: every package the registry knows about, with install
//! status from the ledger.

use anyhow::Result;

use kiln_core::{DirRegistry, StateStore};

use crate::context::CliContext;
use crate::output;

pub fn cmd_list(ctx: &CliContext) -> Result<bool> {
    let registry = DirRegistry::new(&ctx.registry);
    let names = registry.package_names()?;
    let state = StateStore::load(&ctx.paths)?;

    if names.is_empty() {
        output::print_info("No packages in registry");
        return Ok(true);
    }

    for name in &names {
        match state.ledger.get(name) {
            Some(entry) => println!("{} {} (installed)", name, entry.version),
            None => println!("{}", name),
        }
    }
    Ok(true)
}
