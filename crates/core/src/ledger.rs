//! Installation ledger
//!
//! Persisted record of installed packages and their file manifests.
//! Lets repeated installs become no-ops and supports clean removal.
//! One entry per package name; an entry whose recorded files are no
//! longer all present is treated as invalid and forces a rebuild.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheKey;
use crate::{CoreError, Result};

/// One installed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub name: String,
    pub version: String,
    /// Every file the install stage placed under the prefix.
    pub files: Vec<PathBuf>,
    /// The build-cache key this install came from.
    pub record_key: String,
}

/// The installation ledger, persisted between invocations.
#[derive(Debug)]
pub struct InstallationLedger {
    path: Option<PathBuf>,
    entries: BTreeMap<String, LedgerEntry>,
}

impl InstallationLedger {
    /// Load the ledger from `path`, starting empty if the file does
    /// not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|source| CoreError::StateCorrupt {
                path: path.display().to_string(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    /// An unpersisted ledger, for tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
        }
    }

    pub fn has(&self, name: &str, version: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.version == version)
    }

    pub fn get(&self, name: &str) -> Option<&LedgerEntry> {
        self.entries.get(name)
    }

    /// Whether an identical install is already on disk: same cache
    /// key, and every recorded file still present.
    pub fn is_satisfied(&self, key: &CacheKey) -> bool {
        let Some(entry) = self.entries.get(&key.name) else {
            return false;
        };
        entry.record_key == key.to_string() && entry.files.iter().all(|f| f.exists())
    }

    /// Add (or replace) the entry for a package.
    pub fn add(&mut self, entry: LedgerEntry) -> Result<()> {
        debug!(package = %entry.name, version = %entry.version, files = entry.files.len(), "ledger entry added");
        self.entries.insert(entry.name.clone(), entry);
        self.persist()
    }

    /// Remove a package's entry, returning its installed file list.
    pub fn remove(&mut self, name: &str) -> Result<Option<Vec<PathBuf>>> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed.map(|e| e.files))
    }

    /// All installed package names, sorted.
    pub fn installed_names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)
            .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;
        tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }
}
