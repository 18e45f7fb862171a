//! Common-ancestor computation.
//!
//! Each input gets an upward breadth-first traversal following only ChildOf
//! edges, bounded by a generation count. A node is never revisited at a
//! depth greater than or equal to its recorded depth, so cyclic sources
//! terminate. The two ancestor sets are intersected by identifier.

use crate::graph::RelationGraph;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// A shared ancestor with its generational distance from both inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonAncestor {
    pub id: String,
    pub distance_a: u32,
    pub distance_b: u32,
}

/// All ancestors of `id` within `max_generations`, mapped to their minimal
/// generational distance. The starting individual is not its own ancestor.
pub fn ancestor_set(graph: &RelationGraph, id: &str, max_generations: u32) -> HashMap<String, u32> {
    let mut depths: HashMap<String, u32> = HashMap::new();
    let mut queue: VecDeque<(String, u32)> = VecDeque::new();
    queue.push_back((id.to_string(), 0));

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_generations {
            continue;
        }
        for parent in graph.parents(&current) {
            let parent_depth = depth + 1;
            match depths.get(parent) {
                // BFS reaches every node at its minimal depth first; a
                // repeat visit can never improve it.
                Some(_) => continue,
                None => {
                    if parent != id {
                        depths.insert(parent.to_string(), parent_depth);
                    }
                    queue.push_back((parent.to_string(), parent_depth));
                }
            }
        }
    }
    depths
}

/// Shared ancestors of `a` and `b` within `max_generations`, ordered by the
/// sum of the two distances then by identifier, so the closest common
/// ancestors come first.
pub fn common_ancestors(
    graph: &RelationGraph,
    a: &str,
    b: &str,
    max_generations: u32,
) -> Vec<CommonAncestor> {
    let ancestors_a = ancestor_set(graph, a, max_generations);
    let ancestors_b = ancestor_set(graph, b, max_generations);

    let mut shared: Vec<CommonAncestor> = ancestors_a
        .iter()
        .filter_map(|(id, da)| {
            ancestors_b.get(id).map(|db| CommonAncestor {
                id: id.clone(),
                distance_a: *da,
                distance_b: *db,
            })
        })
        .collect();
    shared.sort_by(|x, y| {
        (x.distance_a + x.distance_b, &x.id).cmp(&(y.distance_a + y.distance_b, &y.id))
    });
    shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sex;
    use crate::store::fixtures;

    #[test]
    fn test_parent_is_not_shared_ancestor() {
        // I3 is I5's parent, not a shared ancestor of the two at bound 1
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);
        assert!(common_ancestors(&graph, "@I3@", "@I5@", 1).is_empty());
    }

    #[test]
    fn test_siblings_share_parents() {
        let store = fixtures::store(
            &[
                ("@I1@", "A /X/", Sex::Male, None),
                ("@I2@", "B /X/", Sex::Female, None),
                ("@I3@", "C /X/", Sex::Male, None),
                ("@I4@", "D /X/", Sex::Female, None),
            ],
            &[("@F1@", Some("@I1@"), Some("@I2@"), &["@I3@", "@I4@"])],
        );
        let graph = RelationGraph::build(&store);

        let shared = common_ancestors(&graph, "@I3@", "@I4@", 3);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared[0].id, "@I1@");
        assert_eq!((shared[0].distance_a, shared[0].distance_b), (1, 1));
        assert_eq!(shared[1].id, "@I2@");
    }

    #[test]
    fn test_cousins_share_grandparents() {
        let store = fixtures::store(
            &[
                ("@I1@", "G /X/", Sex::Male, None),
                ("@I2@", "P1 /X/", Sex::Male, None),
                ("@I3@", "P2 /X/", Sex::Female, None),
                ("@I4@", "C1 /X/", Sex::Male, None),
                ("@I5@", "C2 /X/", Sex::Female, None),
            ],
            &[
                ("@F1@", Some("@I1@"), None, &["@I2@", "@I3@"]),
                ("@F2@", Some("@I2@"), None, &["@I4@"]),
                ("@F3@", None, Some("@I3@"), &["@I5@"]),
            ],
        );
        let graph = RelationGraph::build(&store);

        let shared = common_ancestors(&graph, "@I4@", "@I5@", 5);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, "@I1@");
        assert_eq!((shared[0].distance_a, shared[0].distance_b), (2, 2));
    }

    #[test]
    fn test_generation_bound() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        let set = ancestor_set(&graph, "@I5@", 1);
        assert_eq!(set.len(), 2); // parents only
        let set = ancestor_set(&graph, "@I5@", 2);
        assert_eq!(set.len(), 4); // parents and grandparents
    }

    #[test]
    fn test_monotonic_in_generation_bound() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        for g in 1..5 {
            let smaller = ancestor_set(&graph, "@I5@", g);
            let larger = ancestor_set(&graph, "@I5@", g + 1);
            for id in smaller.keys() {
                assert!(larger.contains_key(id));
            }
        }
    }

    #[test]
    fn test_cycle_terminates() {
        // I1 -> I2 -> I3 -> I1 ancestry loop
        let store = fixtures::store(
            &[
                ("@I1@", "A /X/", Sex::Male, None),
                ("@I2@", "B /X/", Sex::Male, None),
                ("@I3@", "C /X/", Sex::Male, None),
            ],
            &[
                ("@F1@", Some("@I2@"), None, &["@I1@"]),
                ("@F2@", Some("@I3@"), None, &["@I2@"]),
                ("@F3@", Some("@I1@"), None, &["@I3@"]),
            ],
        );
        let graph = RelationGraph::build(&store);

        let set = ancestor_set(&graph, "@I1@", 100);
        // The loop eventually reaches every node once, at minimal depth
        assert_eq!(set.get("@I2@"), Some(&1));
        assert_eq!(set.get("@I3@"), Some(&2));
        assert!(!set.contains_key("@I1@"));
    }
}
