//! On-disk layout for kiln
//!
//! Everything kiln touches lives under one root:
//! ```text
//! <root>/
//! ├── registry/              # <name>.toml package manifests
//! ├── sources/<name>/        # fetched source trees, one per package
//! ├── prefix/<name>-<version>-<fp12>/  # isolated install prefixes
//! └── state/                 # build-cache.json, ledger.json
//! ```

use std::path::{Path, PathBuf};

use crate::{PlatformError, Result};

/// Resolved directory layout for one kiln root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KilnPaths {
    pub root: PathBuf,
    pub registry: PathBuf,
    pub sources: PathBuf,
    pub prefix: PathBuf,
    pub state: PathBuf,
}

impl KilnPaths {
    /// Build the layout under an explicit root directory.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            registry: root.join("registry"),
            sources: root.join("sources"),
            prefix: root.join("prefix"),
            state: root.join("state"),
            root,
        }
    }

    /// Default user-level root: `~/.kiln`
    pub fn detect() -> Result<Self> {
        let home = dirs::home_dir().ok_or(PlatformError::NoHomeDirectory)?;
        Ok(Self::with_root(home.join(".kiln")))
    }

    /// Create all layout directories that do not yet exist.
    pub fn init(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.registry,
            &self.sources,
            &self.prefix,
            &self.state,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        tracing::debug!("Initialized layout at {}", self.root.display());
        Ok(())
    }

    /// Source checkout directory for a package.
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.sources.join(name)
    }

    /// Isolated install prefix for one (name, version, fingerprint).
    ///
    /// The fingerprint is shortened to 12 hex characters, matching the
    /// directory-name convention used for state keys elsewhere.
    pub fn prefix_dir(&self, name: &str, version: &str, fingerprint: &str) -> PathBuf {
        let short = &fingerprint[..12.min(fingerprint.len())];
        self.prefix.join(format!("{}-{}-{}", name, version, short))
    }

    /// Path of the persisted build cache.
    pub fn build_cache_file(&self) -> PathBuf {
        self.state.join("build-cache.json")
    }

    /// Path of the persisted installation ledger.
    pub fn ledger_file(&self) -> PathBuf {
        self.state.join("ledger.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_root() {
        let paths = KilnPaths::with_root("/tmp/kiln-root");
        assert_eq!(paths.registry, PathBuf::from("/tmp/kiln-root/registry"));
        assert_eq!(paths.sources, PathBuf::from("/tmp/kiln-root/sources"));
        assert_eq!(paths.state, PathBuf::from("/tmp/kiln-root/state"));
    }

    #[test]
    fn test_init_creates_directories() {
        let temp = TempDir::new().unwrap();
        let paths = KilnPaths::with_root(temp.path().join("kiln"));
        paths.init().unwrap();

        assert!(paths.registry.is_dir());
        assert!(paths.sources.is_dir());
        assert!(paths.prefix.is_dir());
        assert!(paths.state.is_dir());
    }

    #[test]
    fn test_prefix_dir_shortens_fingerprint() {
        let paths = KilnPaths::with_root("/k");
        let dir = paths.prefix_dir("libpng", "1.6.39", "abcdef0123456789deadbeef");
        assert_eq!(
            dir,
            PathBuf::from("/k/prefix/libpng-1.6.39-abcdef012345")
        );
    }

    #[test]
    fn test_prefix_dir_short_fingerprint() {
        let paths = KilnPaths::with_root("/k");
        let dir = paths.prefix_dir("zlib", "1.3", "abc");
        assert_eq!(dir, PathBuf::from("/k/prefix/zlib-1.3-abc"));
    }
}
