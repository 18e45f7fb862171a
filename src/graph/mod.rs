//! Relationship graph derived from an entity store.
//!
//! One node per individual; typed edges derived from family membership.
//! Construction is O(|individuals| + |families|) and pure: identical store
//! content always yields an identical graph, including malformed sources
//! where a record appears among its own ancestors.

pub mod ancestors;
pub mod paths;
pub mod tree;

pub use ancestors::{common_ancestors, CommonAncestor};
pub use paths::{describe_path, shortest_path, LabeledStep, PathOutcome, PathStep};
pub use tree::{ancestor_tree, descendant_tree, Tree, TreeNode};

use crate::error::{GedmcpError, Result};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Edge types. Variant order is the canonical traversal order: spouse edges
/// are visited before parent/child edges, which makes equal-length path
/// tie-breaks reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    SpouseOf,
    /// Source node is a parent of the target.
    ParentOf,
    /// Source node is a child of the target.
    ChildOf,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub kind: EdgeKind,
    pub target: String,
}

/// Adjacency view over one entity store.
#[derive(Debug)]
pub struct RelationGraph {
    adjacency: HashMap<String, Vec<Edge>>,
}

impl RelationGraph {
    /// Build the graph from a store. Edges whose endpoint has no individual
    /// record are dropped; nodes exist for every individual, connected or not.
    pub fn build(store: &EntityStore) -> RelationGraph {
        let mut adjacency: HashMap<String, Vec<Edge>> = store
            .individuals()
            .map(|i| (i.id.clone(), Vec::new()))
            .collect();

        for family in store.families() {
            let spouses: Vec<&str> = family
                .spouses()
                .filter(|s| adjacency.contains_key(*s))
                .collect();
            let children: Vec<&str> = family
                .children
                .iter()
                .map(String::as_str)
                .filter(|c| adjacency.contains_key(*c))
                .collect();

            for (i, &a) in spouses.iter().enumerate() {
                for &b in &spouses[i + 1..] {
                    push_edge(&mut adjacency, a, EdgeKind::SpouseOf, b);
                    push_edge(&mut adjacency, b, EdgeKind::SpouseOf, a);
                }
            }
            for &parent in &spouses {
                for &child in &children {
                    push_edge(&mut adjacency, parent, EdgeKind::ParentOf, child);
                    push_edge(&mut adjacency, child, EdgeKind::ChildOf, parent);
                }
            }
        }

        // Canonical order: spouse < parent < child, then ascending target id.
        // Identical edges contributed by duplicate family rows collapse.
        for edges in adjacency.values_mut() {
            edges.sort();
            edges.dedup();
        }

        RelationGraph { adjacency }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Neighbors of a node in canonical order. Unknown ids yield no edges.
    pub fn neighbors(&self, id: &str) -> &[Edge] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets of ChildOf edges: the node's recorded parents.
    pub fn parents<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.neighbors(id)
            .iter()
            .filter(|e| e.kind == EdgeKind::ChildOf)
            .map(|e| e.target.as_str())
    }

    /// Targets of ParentOf edges: the node's recorded children.
    pub fn children<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.neighbors(id)
            .iter()
            .filter(|e| e.kind == EdgeKind::ParentOf)
            .map(|e| e.target.as_str())
    }

    /// The edge kind between two adjacent nodes, preferring the canonical
    /// order when several relationships connect the same pair.
    pub fn edge_between(&self, from: &str, to: &str) -> Option<EdgeKind> {
        self.neighbors(from)
            .iter()
            .find(|e| e.target == to)
            .map(|e| e.kind)
    }
}

fn push_edge(adjacency: &mut HashMap<String, Vec<Edge>>, from: &str, kind: EdgeKind, to: &str) {
    if let Some(edges) = adjacency.get_mut(from) {
        edges.push(Edge {
            kind,
            target: to.to_string(),
        });
    }
}

/// Validate that a person id exists in the graph before running a query.
pub fn require_person(graph: &RelationGraph, id: &str, source_id: &str) -> Result<()> {
    if graph.contains(id) {
        Ok(())
    } else {
        Err(GedmcpError::PersonNotFound {
            id: id.to_string(),
            source_id: source_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sex;
    use crate::store::fixtures;

    #[test]
    fn test_build_edges() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_between("@I1@", "@I2@"), Some(EdgeKind::SpouseOf));
        assert_eq!(graph.edge_between("@I1@", "@I3@"), Some(EdgeKind::ParentOf));
        assert_eq!(graph.edge_between("@I3@", "@I1@"), Some(EdgeKind::ChildOf));
        assert_eq!(graph.edge_between("@I1@", "@I5@"), None);

        let parents: Vec<&str> = graph.parents("@I3@").collect();
        assert_eq!(parents, vec!["@I1@", "@I2@"]);
        let children: Vec<&str> = graph.children("@I3@").collect();
        assert_eq!(children, vec!["@I5@"]);
    }

    #[test]
    fn test_canonical_neighbor_order() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        // @I3@ has a spouse, two parents and one child: spouse edge first,
        // then parent-of, then child-of, each ascending by id.
        let kinds: Vec<EdgeKind> = graph.neighbors("@I3@").iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EdgeKind::SpouseOf,
                EdgeKind::ParentOf,
                EdgeKind::ChildOf,
                EdgeKind::ChildOf
            ]
        );
        assert_eq!(graph.neighbors("@I3@")[0].target, "@I4@");
    }

    #[test]
    fn test_multiple_parent_sets() {
        let store = fixtures::store(
            &[
                ("@I1@", "A /X/", Sex::Male, None),
                ("@I2@", "B /X/", Sex::Female, None),
                ("@I3@", "C /Y/", Sex::Female, None),
                ("@I4@", "D /X/", Sex::Male, None),
            ],
            &[
                ("@F1@", Some("@I1@"), Some("@I2@"), &["@I4@"]),
                ("@F2@", Some("@I1@"), Some("@I3@"), &["@I4@"]),
            ],
        );
        let graph = RelationGraph::build(&store);
        let parents: Vec<&str> = graph.parents("@I4@").collect();
        // Step-relationships retained; the duplicate @I1@ edge collapses
        assert_eq!(parents, vec!["@I1@", "@I2@", "@I3@"]);
    }

    #[test]
    fn test_self_cycle_tolerated() {
        // Malformed source: a record listed as its own child
        let store = fixtures::store(
            &[("@I1@", "A /X/", Sex::Male, None)],
            &[("@F1@", Some("@I1@"), None, &["@I1@"])],
        );
        let graph = RelationGraph::build(&store);
        assert_eq!(graph.edge_between("@I1@", "@I1@"), Some(EdgeKind::ParentOf));
    }

    #[test]
    fn test_deterministic_build() {
        let store = fixtures::three_generations();
        let a = RelationGraph::build(&store);
        let b = RelationGraph::build(&store);
        for id in ["@I1@", "@I2@", "@I3@", "@I4@", "@I5@"] {
            assert_eq!(a.neighbors(id), b.neighbors(id));
        }
    }

    #[test]
    fn test_require_person() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);
        assert!(require_person(&graph, "@I1@", "src").is_ok());
        let err = require_person(&graph, "@I99@", "src").unwrap_err();
        assert!(matches!(err, GedmcpError::PersonNotFound { .. }));
    }
}
