//! Durable build cache
//!
//! Maps `(name, version, dependency fingerprint)` to a completed
//! artifact record so repeated installs are incremental. Records are
//! append-only: a changed fingerprint produces a new key rather than
//! overwriting, and a same-key re-record is accepted only when the
//! prior artifact has gone missing from disk.
//!
//! Persisted as JSON; every update rewrites the file through a temp
//! file plus rename, so a concurrent reader never observes a torn
//! write.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CoreError, Result};

/// Cache key: package identity plus its dependency-closure fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub version: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(name: &str, version: &str, fingerprint: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            fingerprint: fingerprint.to_string(),
        }
    }
}

impl CacheKey {
    /// Invert [`CacheKey::to_string`]; used to map a ledger entry's
    /// record key back to its prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        let (rest, fingerprint) = raw.rsplit_once('#')?;
        let (name, version) = rest.rsplit_once('@')?;
        Some(Self::new(name, version, fingerprint))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.name, self.version, self.fingerprint)
    }
}

/// A completed build, keyed by [`CacheKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub prefix: PathBuf,
    pub built_at: DateTime<Utc>,
    pub success: bool,
}

impl BuildRecord {
    /// Whether the recorded artifact still exists on disk.
    pub fn artifact_present(&self) -> bool {
        self.prefix.is_dir()
    }
}

/// The build cache, persisted between invocations.
#[derive(Debug)]
pub struct BuildCache {
    path: Option<PathBuf>,
    records: BTreeMap<String, BuildRecord>,
}

impl BuildCache {
    /// Load the cache from `path`, starting empty if the file does not
    /// exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let records = if path.exists() {
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
            records,
        })
    }

    /// An unpersisted cache, for tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: BTreeMap::new(),
        }
    }

    /// Pure read: the record for `key`, if one was ever written.
    pub fn lookup(&self, key: &CacheKey) -> Option<&BuildRecord> {
        self.records.get(&key.to_string())
    }

    /// Record a completed build.
    ///
    /// Append-only: if a record already exists for this key and its
    /// artifact is still present, the prior record is kept untouched.
    pub fn record(&mut self, key: &CacheKey, prefix: &Path) -> Result<&BuildRecord> {
        let slot = key.to_string();

        let keep_prior = self
            .records
            .get(&slot)
            .is_some_and(|prior| prior.artifact_present());
        if !keep_prior {
            self.records.insert(
                slot.clone(),
                BuildRecord {
                    prefix: prefix.to_path_buf(),
                    built_at: Utc::now(),
                    success: true,
                },
            );
            self.persist()?;
            debug!(key = %key, "build recorded");
        }

        Ok(&self.records[&slot])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.records)
            .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;
        tmp.persist(path)
            .map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }
}
