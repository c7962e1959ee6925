//! Dependency graph construction
//!
//! Builds a directed graph (package -> its dependencies) from a set of
//! requested roots by resolving manifests recursively. Traversal is an
//! iterative depth-first walk with explicit tri-color marking, so deep
//! chains cannot overflow the call stack and back-edges surface as
//! `CycleDetected` with the offending chain. A node shared by several
//! dependents (the diamond case) is resolved and added exactly once.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::manifest::{ManifestStore, PackageManifest};
use crate::{CoreError, Result};

/// One node of the graph: a manifest owned by the store, plus the
/// arena indices of its direct dependencies.
#[derive(Debug)]
pub struct Node<'a> {
    pub manifest: &'a PackageManifest,
    pub deps: Vec<usize>,
}

/// A directed acyclic dependency graph over borrowed manifests.
///
/// Built fresh per invocation; never persisted.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    nodes: Vec<Node<'a>>,
    index: HashMap<String, usize>,
    /// Node indices in dependency-first (post-order) sequence.
    topo: Vec<usize>,
    /// The requested roots, deduplicated and sorted.
    roots: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current traversal path.
    InProgress,
    /// Fully resolved, all dependencies visited.
    Done,
}

struct Frame {
    name: String,
    /// Next dependency of `name` to visit.
    cursor: usize,
}

impl<'a> DependencyGraph<'a> {
    /// Resolve `roots` and every transitive dependency into a graph.
    ///
    /// Fails with `CycleDetected` on a back-edge, `DependencyConflict`
    /// when a version pin disagrees with the resolved manifest, and
    /// propagates `ManifestNotFound` / `ManifestInvalid` from
    /// resolution.
    pub fn build(store: &'a mut ManifestStore, roots: &[String]) -> Result<Self> {
        let root_set: BTreeSet<String> = roots.iter().cloned().collect();

        let mut marks: HashMap<String, Mark> = HashMap::new();
        // Current InProgress chain, for cycle reporting.
        let mut path: Vec<String> = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        // Discovery order and edges, by name; turned into the arena
        // once resolution is complete.
        let mut order: Vec<String> = Vec::new();
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut topo_names: Vec<String> = Vec::new();

        for root in &root_set {
            if marks.get(root.as_str()) == Some(&Mark::Done) {
                continue;
            }
            enter(store, root, None, &mut marks, &mut path, &mut order, &mut edges)?;
            stack.push(Frame {
                name: root.clone(),
                cursor: 0,
            });

            while let Some(frame) = stack.last_mut() {
                let deps = store.resolve(&frame.name)?.deps.clone();

                if frame.cursor >= deps.len() {
                    marks.insert(frame.name.clone(), Mark::Done);
                    topo_names.push(frame.name.clone());
                    path.pop();
                    stack.pop();
                    continue;
                }

                let req = deps[frame.cursor].clone();
                frame.cursor += 1;
                let parent = frame.name.clone();

                match marks.get(req.name.as_str()) {
                    Some(Mark::InProgress) => {
                        // Back-edge: report the cycle starting at the
                        // first occurrence of the dependency.
                        let start = path
                            .iter()
                            .position(|n| *n == req.name)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> = path[start..].to_vec();
                        cycle.push(req.name.clone());
                        return Err(CoreError::CycleDetected { path: cycle });
                    }
                    Some(Mark::Done) => {
                        // Shared dependency, already resolved once.
                        check_pin(store, &req)?;
                        edges.get_mut(&parent).unwrap().push(req.name.clone());
                    }
                    None => {
                        enter(
                            store,
                            &req.name,
                            Some(&req),
                            &mut marks,
                            &mut path,
                            &mut order,
                            &mut edges,
                        )?;
                        edges.get_mut(&parent).unwrap().push(req.name.clone());
                        stack.push(Frame {
                            name: req.name,
                            cursor: 0,
                        });
                    }
                }
            }
        }

        // Resolution is complete; build the arena over shared borrows.
        let store: &'a ManifestStore = store;
        let mut index = HashMap::new();
        let mut nodes = Vec::with_capacity(order.len());
        for (i, name) in order.iter().enumerate() {
            index.insert(name.clone(), i);
            nodes.push(Node {
                manifest: store.get(name).expect("resolved during traversal"),
                deps: Vec::new(),
            });
        }
        for (name, dep_names) in &edges {
            let i = index[name];
            nodes[i].deps = dep_names.iter().map(|d| index[d]).collect();
        }
        let topo = topo_names.iter().map(|n| index[n]).collect();

        debug!(packages = nodes.len(), "dependency graph built");
        Ok(Self {
            nodes,
            index,
            topo,
            roots: root_set.into_iter().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn node(&self, idx: usize) -> &Node<'a> {
        &self.nodes[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn manifest(&self, name: &str) -> Option<&'a PackageManifest> {
        self.index_of(name).map(|i| self.nodes[i].manifest)
    }

    /// Node indices in dependency-first order: every node appears
    /// after all of its dependencies.
    pub fn topo_order(&self) -> &[usize] {
        &self.topo
    }

    /// All package names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.iter().map(|n| n.manifest.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// First visit of a package: resolve its manifest, validate any pin
/// from the requesting dependent, and mark it in progress.
fn enter(
    store: &mut ManifestStore,
    name: &str,
    req: Option<&crate::manifest::DependencyReq>,
    marks: &mut HashMap<String, Mark>,
    path: &mut Vec<String>,
    order: &mut Vec<String>,
    edges: &mut HashMap<String, Vec<String>>,
) -> Result<()> {
    store.resolve(name)?;
    if let Some(req) = req {
        check_pin(store, req)?;
    }
    marks.insert(name.to_string(), Mark::InProgress);
    path.push(name.to_string());
    order.push(name.to_string());
    edges.insert(name.to_string(), Vec::new());
    Ok(())
}

/// A version pin must agree with the version the manifest store
/// resolves. Two dependents pinning different versions therefore
/// cannot both pass; conflicting requirements are a resolver error,
/// never silently picked between.
fn check_pin(store: &mut ManifestStore, req: &crate::manifest::DependencyReq) -> Result<()> {
    if let Some(pin) = &req.version {
        let resolved = store.resolve(&req.name)?.version.clone();
        if *pin != resolved {
            return Err(CoreError::DependencyConflict {
                name: req.name.clone(),
                requested: pin.clone(),
                resolved,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::store;

    #[test]
    fn test_linear_chain() {
        let mut s = store(&[
            ("a", "1", &["b"]),
            ("b", "1", &["c"]),
            ("c", "1", &[]),
        ]);
        let graph = DependencyGraph::build(&mut s, &["a".to_string()]).unwrap();
        assert_eq!(graph.len(), 3);

        // Topological order has every package after its dependencies.
        let topo: Vec<&str> = graph
            .topo_order()
            .iter()
            .map(|&i| graph.node(i).manifest.name.as_str())
            .collect();
        assert_eq!(topo, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_diamond_resolved_once() {
        let mut s = store(&[
            ("app", "1", &["a", "b"]),
            ("a", "1", &["c"]),
            ("b", "1", &["c"]),
            ("c", "1", &[]),
        ]);
        let graph = DependencyGraph::build(&mut s, &["app".to_string()]).unwrap();
        // c appears exactly once even though a and b both depend on it.
        assert_eq!(graph.len(), 4);
        let c = graph.index_of("c").unwrap();
        let a = graph.index_of("a").unwrap();
        let b = graph.index_of("b").unwrap();
        assert_eq!(graph.node(a).deps, vec![c]);
        assert_eq!(graph.node(b).deps, vec![c]);
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let mut s = store(&[
            ("a", "1", &["b"]),
            ("b", "1", &["c"]),
            ("c", "1", &["a"]),
        ]);
        let err = DependencyGraph::build(&mut s, &["a".to_string()]).unwrap_err();
        match err {
            CoreError::CycleDetected { path } => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_two_node_cycle() {
        let mut s = store(&[("a", "1", &["b"]), ("b", "1", &["a"])]);
        let err = DependencyGraph::build(&mut s, &["a".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::CycleDetected { .. }));
    }

    #[test]
    fn test_missing_dependency_propagates() {
        let mut s = store(&[("a", "1", &["ghost"])]);
        let err = DependencyGraph::build(&mut s, &["a".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::ManifestNotFound(name) if name == "ghost"));
    }

    #[test]
    fn test_version_pin_conflict() {
        let mut s = store(&[
            ("app", "1", &["zlib@1.2"]),
            ("zlib", "1.3", &[]),
        ]);
        let err = DependencyGraph::build(&mut s, &["app".to_string()]).unwrap_err();
        match err {
            CoreError::DependencyConflict {
                name,
                requested,
                resolved,
            } => {
                assert_eq!(name, "zlib");
                assert_eq!(requested, "1.2");
                assert_eq!(resolved, "1.3");
            }
            other => panic!("expected DependencyConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_pin_accepted() {
        let mut s = store(&[
            ("app", "1", &["zlib@1.3"]),
            ("tool", "1", &["zlib@1.3"]),
            ("zlib", "1.3", &[]),
        ]);
        let graph =
            DependencyGraph::build(&mut s, &["app".to_string(), "tool".to_string()]).unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_multiple_roots_share_nodes() {
        let mut s = store(&[
            ("x", "1", &["lib"]),
            ("y", "1", &["lib"]),
            ("lib", "1", &[]),
        ]);
        let graph =
            DependencyGraph::build(&mut s, &["y".to_string(), "x".to_string()]).unwrap();
        assert_eq!(graph.len(), 3);
        // Roots come back deduplicated and sorted.
        assert_eq!(graph.roots(), &["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_empty_roots() {
        let mut s = store(&[]);
        let graph = DependencyGraph::build(&mut s, &[]).unwrap();
        assert!(graph.is_empty());
    }
}
