//! Package manifests and the manifest store
//!
//! A manifest is the declarative description of one package: where its
//! source comes from, what it depends on, and how to build and install
//! it. On disk a manifest is a TOML file in the registry directory:
//!
//! ```toml
//! name = "freetype"
//! version = "2.12.1"
//! dependencies = ["libpng", "zlib@1.3"]
//!
//! [source]
//! type = "archive"
//! url = "https://example.org/freetype-2.12.1.tar.gz"
//! sha256 = "..."
//!
//! [[build]]
//! argv = ["./configure", "--prefix=${PREFIX}"]
//!
//! [[build]]
//! argv = ["make"]
//!
//! [[install]]
//! argv = ["make", "install"]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CoreError, Result};

/// Where a package's source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    /// Clone a repository and check out a fixed ref.
    Git {
        repository: String,
        #[serde(rename = "ref")]
        reference: String,
    },
    /// Download an archive, optionally verifying its SHA256 digest.
    Archive {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    /// Copy a local directory. Used for local formulae and tests.
    Local { path: PathBuf },
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Git {
                repository,
                reference,
            } => write!(f, "git {} @ {}", repository, reference),
            Source::Archive { url, .. } => write!(f, "archive {}", url),
            Source::Local { path } => write!(f, "local {}", path.display()),
        }
    }
}

/// One build or install command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub argv: Vec<String>,
}

/// A dependency request: a package name with an optional version pin.
///
/// Written `name` or `name@version` in the manifest's dependency list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyReq {
    pub name: String,
    pub version: Option<String>,
}

impl DependencyReq {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('@') {
            Some((name, version)) => Self {
                name: name.to_string(),
                version: Some(version.to_string()),
            },
            None => Self {
                name: raw.to_string(),
                version: None,
            },
        }
    }
}

impl fmt::Display for DependencyReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Raw on-disk form, before validation.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    version: String,
    #[serde(default)]
    dependencies: Vec<String>,
    source: Source,
    #[serde(default)]
    build: Vec<BuildStep>,
    #[serde(default)]
    install: Vec<BuildStep>,
}

/// An immutable, validated package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub deps: Vec<DependencyReq>,
    pub source: Source,
    pub build: Vec<BuildStep>,
    pub install: Vec<BuildStep>,
}

impl PackageManifest {
    /// Parse and validate a manifest from its TOML text.
    ///
    /// `expected_name` is the name the manifest was looked up under;
    /// a mismatch is treated as an invalid manifest.
    pub fn parse(expected_name: &str, raw: &str) -> Result<Self> {
        let invalid = |reason: String| CoreError::ManifestInvalid {
            name: expected_name.to_string(),
            reason,
        };

        let raw: RawManifest =
            toml::from_str(raw).map_err(|e| invalid(format!("TOML parse error: {}", e)))?;

        if raw.name.is_empty() {
            return Err(invalid("empty package name".to_string()));
        }
        if raw.name != expected_name {
            return Err(invalid(format!(
                "manifest declares name '{}', expected '{}'",
                raw.name, expected_name
            )));
        }
        if raw.version.is_empty() {
            return Err(invalid("empty version".to_string()));
        }

        let deps: Vec<DependencyReq> = raw
            .dependencies
            .iter()
            .map(|d| DependencyReq::parse(d))
            .collect();

        for dep in &deps {
            if dep.name.is_empty() {
                return Err(invalid("empty dependency name".to_string()));
            }
            if dep.name == raw.name {
                return Err(invalid("package depends on itself".to_string()));
            }
        }

        for step in raw.build.iter().chain(raw.install.iter()) {
            if step.argv.is_empty() {
                return Err(invalid("build step with empty argv".to_string()));
            }
        }

        Ok(Self {
            name: raw.name,
            version: raw.version,
            deps,
            source: raw.source,
            build: raw.build,
            install: raw.install,
        })
    }
}

/// Lookup interface for raw manifest data.
///
/// Backed by a registry directory here; a remote index would implement
/// the same trait.
pub trait ManifestSource {
    /// Raw manifest text for `name`, or `None` if this source does not
    /// define the package.
    fn find_manifest(&self, name: &str) -> Result<Option<String>>;
}

/// A directory of `<name>.toml` manifest files.
pub struct DirRegistry {
    dir: PathBuf,
}

impl DirRegistry {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Names of all packages defined in this registry, sorted.
    pub fn package_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.dir.exists() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl ManifestSource for DirRegistry {
    fn find_manifest(&self, name: &str) -> Result<Option<String>> {
        let path = self.dir.join(format!("{}.toml", name));
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }
}

/// Loads and memoizes manifests for one invocation.
///
/// Resolution is idempotent: repeated calls for the same name return
/// the identical structural value without consulting the source again.
pub struct ManifestStore {
    source: Box<dyn ManifestSource>,
    cache: HashMap<String, PackageManifest>,
}

impl ManifestStore {
    pub fn new(source: Box<dyn ManifestSource>) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    /// Resolve a package name to its manifest.
    pub fn resolve(&mut self, name: &str) -> Result<&PackageManifest> {
        if !self.cache.contains_key(name) {
            let raw = self
                .source
                .find_manifest(name)?
                .ok_or_else(|| CoreError::ManifestNotFound(name.to_string()))?;
            let manifest = PackageManifest::parse(name, &raw)?;
            debug!(package = name, version = %manifest.version, "resolved manifest");
            self.cache.insert(name.to_string(), manifest);
        }
        Ok(&self.cache[name])
    }

    /// A manifest that has already been resolved this invocation.
    pub fn get(&self, name: &str) -> Option<&PackageManifest> {
        self.cache.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREETYPE: &str = r#"
        name = "freetype"
        version = "2.12.1"
        dependencies = ["libpng", "zlib@1.3"]

        [source]
        type = "archive"
        url = "https://example.org/freetype-2.12.1.tar.gz"
        sha256 = "deadbeef"

        [[build]]
        argv = ["./configure", "--prefix=${PREFIX}"]

        [[install]]
        argv = ["make", "install"]
    "#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PackageManifest::parse("freetype", FREETYPE).unwrap();
        assert_eq!(manifest.name, "freetype");
        assert_eq!(manifest.version, "2.12.1");
        assert_eq!(manifest.deps.len(), 2);
        assert_eq!(manifest.deps[0].name, "libpng");
        assert_eq!(manifest.deps[0].version, None);
        assert_eq!(manifest.deps[1].name, "zlib");
        assert_eq!(manifest.deps[1].version.as_deref(), Some("1.3"));
        assert!(matches!(manifest.source, Source::Archive { .. }));
    }

    #[test]
    fn test_parse_git_source() {
        let raw = r#"
            name = "sdl"
            version = "2.26.1"

            [source]
            type = "git"
            repository = "https://github.com/libsdl-org/SDL.git"
            ref = "release-2.26.1"
        "#;
        let manifest = PackageManifest::parse("sdl", raw).unwrap();
        assert_eq!(
            manifest.source,
            Source::Git {
                repository: "https://github.com/libsdl-org/SDL.git".to_string(),
                reference: "release-2.26.1".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_self_dependency() {
        let raw = r#"
            name = "a"
            version = "1"
            dependencies = ["a"]

            [source]
            type = "local"
            path = "/src/a"
        "#;
        let err = PackageManifest::parse("a", raw).unwrap_err();
        assert!(matches!(err, CoreError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_parse_rejects_name_mismatch() {
        let raw = r#"
            name = "b"
            version = "1"

            [source]
            type = "local"
            path = "/src/b"
        "#;
        let err = PackageManifest::parse("a", raw).unwrap_err();
        assert!(matches!(err, CoreError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_parse_rejects_malformed_toml() {
        let err = PackageManifest::parse("a", "name = ").unwrap_err();
        assert!(matches!(err, CoreError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_dependency_req_parse() {
        let plain = DependencyReq::parse("libpng");
        assert_eq!(plain.name, "libpng");
        assert_eq!(plain.version, None);

        let pinned = DependencyReq::parse("zlib@1.2.13");
        assert_eq!(pinned.name, "zlib");
        assert_eq!(pinned.version.as_deref(), Some("1.2.13"));
    }

    #[test]
    fn test_store_not_found() {
        struct Empty;
        impl ManifestSource for Empty {
            fn find_manifest(&self, _: &str) -> Result<Option<String>> {
                Ok(None)
            }
        }

        let mut store = ManifestStore::new(Box::new(Empty));
        let err = store.resolve("nope").unwrap_err();
        assert!(matches!(err, CoreError::ManifestNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_store_memoizes() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct Counting {
            calls: Rc<Cell<usize>>,
        }
        impl ManifestSource for Counting {
            fn find_manifest(&self, _: &str) -> Result<Option<String>> {
                self.calls.set(self.calls.get() + 1);
                Ok(Some(FREETYPE.to_string()))
            }
        }

        let calls = Rc::new(Cell::new(0));
        let mut store = ManifestStore::new(Box::new(Counting {
            calls: calls.clone(),
        }));

        let first = store.resolve("freetype").unwrap().clone();
        let second = store.resolve("freetype").unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_dir_registry() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("freetype.toml"), FREETYPE).unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let registry = DirRegistry::new(temp.path());
        assert_eq!(registry.package_names().unwrap(), vec!["freetype"]);
        assert!(registry.find_manifest("freetype").unwrap().is_some());
        assert!(registry.find_manifest("zlib").unwrap().is_none());
    }
}
