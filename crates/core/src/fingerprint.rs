//! Dependency fingerprints
//!
//! A package's fingerprint is the SHA256 digest of the sorted list of
//! `(dependency name, dependency version, dependency fingerprint)`
//! triples. Because each entry folds in the dependency's own
//! fingerprint, the digest captures the full transitive subtree: any
//! upstream version change invalidates every downstream cache key.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::graph::DependencyGraph;

/// Compute fingerprints for every package in the graph.
///
/// Walks the graph in dependency-first order so each fingerprint's
/// inputs are already available.
pub fn compute_fingerprints(graph: &DependencyGraph<'_>) -> HashMap<String, String> {
    let mut fingerprints: HashMap<String, String> = HashMap::with_capacity(graph.len());

    for &idx in graph.topo_order() {
        let node = graph.node(idx);

        let mut entries: Vec<(String, String, String)> = node
            .deps
            .iter()
            .map(|&d| {
                let dep = graph.node(d).manifest;
                let fp = fingerprints[&dep.name].clone();
                (dep.name.clone(), dep.version.clone(), fp)
            })
            .collect();
        entries.sort();

        let mut hasher = Sha256::new();
        for (name, version, fp) in &entries {
            hasher.update(name.as_bytes());
            hasher.update(b"\t");
            hasher.update(version.as_bytes());
            hasher.update(b"\t");
            hasher.update(fp.as_bytes());
            hasher.update(b"\n");
        }

        fingerprints.insert(node.manifest.name.clone(), hex::encode(hasher.finalize()));
    }

    fingerprints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;
    use crate::testutil::store;

    fn fingerprints(packages: &[(&str, &str, &[&str])], roots: &[&str]) -> HashMap<String, String> {
        let mut s = store(packages);
        let roots: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
        let graph = DependencyGraph::build(&mut s, &roots).unwrap();
        compute_fingerprints(&graph)
    }

    #[test]
    fn test_leaves_share_empty_fingerprint() {
        let fps = fingerprints(
            &[("app", "1", &["a", "b"]), ("a", "1", &[]), ("b", "2", &[])],
            &["app"],
        );
        // Leaves hash an empty dependency list; their cache keys still
        // differ through (name, version).
        assert_eq!(fps["a"], fps["b"]);
        assert_ne!(fps["app"], fps["a"]);
    }

    #[test]
    fn test_leaf_version_change_propagates() {
        let old = fingerprints(
            &[
                ("app", "1", &["mid"]),
                ("mid", "1", &["leaf"]),
                ("leaf", "1.0", &[]),
                ("other", "1", &[]),
            ],
            &["app", "other"],
        );
        let new = fingerprints(
            &[
                ("app", "1", &["mid"]),
                ("mid", "1", &["leaf"]),
                ("leaf", "2.0", &[]),
                ("other", "1", &[]),
            ],
            &["app", "other"],
        );

        // Everything downstream of the leaf changes.
        assert_ne!(old["mid"], new["mid"]);
        assert_ne!(old["app"], new["app"]);
        // Unrelated packages keep their fingerprint.
        assert_eq!(old["other"], new["other"]);
    }

    #[test]
    fn test_dependency_order_is_irrelevant() {
        let ab = fingerprints(
            &[("app", "1", &["a", "b"]), ("a", "1", &[]), ("b", "1", &[])],
            &["app"],
        );
        let ba = fingerprints(
            &[("app", "1", &["b", "a"]), ("a", "1", &[]), ("b", "1", &[])],
            &["app"],
        );
        assert_eq!(ab["app"], ba["app"]);
    }

    #[test]
    fn test_diamond_is_stable() {
        let fps = fingerprints(
            &[
                ("app", "1", &["a", "b"]),
                ("a", "1", &["c"]),
                ("b", "1", &["c"]),
                ("c", "1", &[]),
            ],
            &["app"],
        );
        // Both paths see the same c fingerprint.
        assert_eq!(fps.len(), 4);
        assert_eq!(fps["a"], fps["b"]);
    }
}
