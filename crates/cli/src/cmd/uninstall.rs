//! Uninstall command: remove an installed package's files, its prefix,
//! and its ledger entry.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use kiln_core::{CacheKey, StateStore};

use crate::context::CliContext;
use crate::output;

pub fn cmd_uninstall(ctx: &CliContext, package: &str) -> Result<bool> {
    let mut state = StateStore::load(&ctx.paths)?;

    let Some(entry) = state.ledger.get(package) else {
        output::print_error(&format!("{} is not installed", package));
        return Ok(false);
    };

    // Recover the prefix from the cache record when it is still
    // around, otherwise re-derive it from the record key.
    let prefix: Option<PathBuf> = CacheKey::parse(&entry.record_key).map(|key| {
        state
            .cache
            .lookup(&key)
            .map(|r| r.prefix.clone())
            .unwrap_or_else(|| ctx.paths.prefix_dir(&key.name, &key.version, &key.fingerprint))
    });

    info!(package, "uninstalling");
    let Some(files) = state.ledger.remove(package)? else {
        return Ok(false);
    };

    let mut removed = 0usize;
    for file in &files {
        match std::fs::remove_file(file) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %file.display(), "already gone");
            }
            Err(e) => warn!(file = %file.display(), error = %e, "could not remove"),
        }
    }

    if let Some(prefix) = prefix {
        if prefix.exists() {
            std::fs::remove_dir_all(&prefix)?;
        }
    }

    output::print_success(&format!("Removed {} ({} files)", package, removed));
    Ok(true)
}
