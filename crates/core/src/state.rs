//! Shared persisted state: build cache plus installation ledger
//!
//! Both stores are shared mutable state across all workers, so they
//! live together behind one mutex. The success commit for a package
//! (cache record, then ledger append) happens under a single lock
//! acquisition; two packages' commits never interleave.

use std::path::Path;

use kiln_platform::KilnPaths;

use crate::cache::{BuildCache, CacheKey};
use crate::ledger::{InstallationLedger, LedgerEntry};
use crate::Result;

pub struct StateStore {
    pub cache: BuildCache,
    pub ledger: InstallationLedger,
}

impl StateStore {
    /// Load both stores from the layout's state directory.
    pub fn load(paths: &KilnPaths) -> Result<Self> {
        Ok(Self {
            cache: BuildCache::load(&paths.build_cache_file())?,
            ledger: InstallationLedger::load(&paths.ledger_file())?,
        })
    }

    /// Unpersisted stores, for tests.
    pub fn in_memory() -> Self {
        Self {
            cache: BuildCache::in_memory(),
            ledger: InstallationLedger::in_memory(),
        }
    }

    /// Whether an install for `key` is already complete and intact:
    /// ledger entry with the same key and all recorded files present.
    pub fn install_satisfied(&self, key: &CacheKey) -> bool {
        self.ledger.is_satisfied(key)
    }

    /// Whether a build artifact for `key` is already on disk,
    /// regardless of whether it was ever installed.
    pub fn build_satisfied(&self, key: &CacheKey) -> bool {
        self.cache
            .lookup(key)
            .is_some_and(|r| r.success && r.artifact_present())
    }

    /// Commit one package's success: build-cache record plus, when
    /// installed, the ledger entry. Callers hold the surrounding
    /// mutex, making this a single transaction.
    pub fn commit_success(
        &mut self,
        key: &CacheKey,
        prefix: &Path,
        installed_files: Option<Vec<std::path::PathBuf>>,
    ) -> Result<()> {
        self.cache.record(key, prefix)?;
        if let Some(files) = installed_files {
            self.ledger.add(LedgerEntry {
                name: key.name.clone(),
                version: key.version.clone(),
                files,
                record_key: key.to_string(),
            })?;
        }
        Ok(())
    }
}
