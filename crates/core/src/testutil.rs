//! Shared test fixtures for kiln-core unit tests.

use std::collections::HashMap;

use crate::manifest::{ManifestSource, ManifestStore};
use crate::Result;

/// In-memory manifest source: name -> (version, dependency list).
///
/// Emits local-source manifests with no build or install steps, which
/// is all graph and scheduler tests need.
pub(crate) struct MapSource {
    packages: HashMap<String, (String, Vec<String>)>,
}

impl MapSource {
    pub(crate) fn new(packages: &[(&str, &str, &[&str])]) -> Self {
        Self {
            packages: packages
                .iter()
                .map(|(name, version, deps)| {
                    (
                        name.to_string(),
                        (
                            version.to_string(),
                            deps.iter().map(|d| d.to_string()).collect(),
                        ),
                    )
                })
                .collect(),
        }
    }
}

impl ManifestSource for MapSource {
    fn find_manifest(&self, name: &str) -> Result<Option<String>> {
        let Some((version, deps)) = self.packages.get(name) else {
            return Ok(None);
        };
        let dep_list = deps
            .iter()
            .map(|d| format!("{:?}", d))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Some(format!(
            "name = {:?}\nversion = {:?}\ndependencies = [{}]\n\
             [source]\ntype = \"local\"\npath = \"/src/{}\"\n",
            name, version, dep_list, name
        )))
    }
}

/// Manifest store over an in-memory package table.
pub(crate) fn store(packages: &[(&str, &str, &[&str])]) -> ManifestStore {
    ManifestStore::new(Box::new(MapSource::new(packages)))
}
