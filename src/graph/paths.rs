//! Shortest relationship path between two individuals.
//!
//! Bidirectional breadth-first search treating every edge type as
//! traversable and unweighted. Visited tracking is mandatory: genealogical
//! sources routinely contain cycles from data-entry errors, and the search
//! must terminate on them.

use crate::graph::{EdgeKind, RelationGraph};
use crate::model::Sex;
use crate::store::EntityStore;
use serde::Serialize;
use std::collections::HashMap;

/// One step of a path: an individual and its relationship to the next step
/// (None on the final step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep {
    pub person: String,
    pub relation_to_next: Option<EdgeKind>,
}

/// Outcome of a path query. Two individuals in disconnected components is a
/// normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PathOutcome {
    Path { steps: Vec<PathStep> },
    NoPath,
}

impl PathOutcome {
    /// Number of edges in the path, if one was found.
    pub fn len(&self) -> Option<usize> {
        match self {
            PathOutcome::Path { steps } => Some(steps.len().saturating_sub(1)),
            PathOutcome::NoPath => None,
        }
    }
}

/// One BFS wave. `prev` records the predecessor toward this side's origin,
/// which doubles as the visited set.
struct Wave {
    dist: HashMap<String, u32>,
    prev: HashMap<String, String>,
    frontier: Vec<String>,
    depth: u32,
}

impl Wave {
    fn start(origin: &str) -> Wave {
        let mut dist = HashMap::new();
        dist.insert(origin.to_string(), 0);
        Wave {
            dist,
            prev: HashMap::new(),
            frontier: vec![origin.to_string()],
            depth: 0,
        }
    }

    /// Expand one full level. Newly discovered nodes that the other wave has
    /// already reached become meeting candidates, reported in discovery
    /// order so equal-length paths resolve identically on every run.
    fn expand(&mut self, graph: &RelationGraph, other: &Wave, best: &mut Option<(u32, String)>) {
        let mut next = Vec::new();
        for node in std::mem::take(&mut self.frontier) {
            for edge in graph.neighbors(&node) {
                if self.dist.contains_key(&edge.target) {
                    continue;
                }
                self.dist.insert(edge.target.clone(), self.depth + 1);
                self.prev.insert(edge.target.clone(), node.clone());
                if let Some(other_dist) = other.dist.get(&edge.target) {
                    let total = self.depth + 1 + other_dist;
                    if best.as_ref().map_or(true, |(t, _)| total < *t) {
                        *best = Some((total, edge.target.clone()));
                    }
                }
                next.push(edge.target.clone());
            }
        }
        self.frontier = next;
        self.depth += 1;
    }

    /// Chain from `node` back to this wave's origin, origin last.
    fn chain_to_origin(&self, node: &str) -> Vec<String> {
        let mut chain = vec![node.to_string()];
        let mut current = node;
        while let Some(prev) = self.prev.get(current) {
            chain.push(prev.clone());
            current = prev;
        }
        chain
    }
}

/// Find one minimum-edge-count path between two individuals. Callers must
/// have validated both endpoints with [`crate::graph::require_person`].
pub fn shortest_path(graph: &RelationGraph, a: &str, b: &str) -> PathOutcome {
    if !graph.contains(a) || !graph.contains(b) {
        return PathOutcome::NoPath;
    }
    if a == b {
        return PathOutcome::Path {
            steps: vec![PathStep {
                person: a.to_string(),
                relation_to_next: None,
            }],
        };
    }

    let mut forward = Wave::start(a);
    let mut backward = Wave::start(b);
    let mut best: Option<(u32, String)> = None;

    while !forward.frontier.is_empty() && !backward.frontier.is_empty() {
        // A shorter path than `best` would need an undiscovered meeting
        // node, which cannot beat the depths already searched.
        if let Some((total, _)) = best {
            if forward.depth + backward.depth >= total {
                break;
            }
        }
        if forward.frontier.len() <= backward.frontier.len() {
            forward.expand(graph, &backward, &mut best);
        } else {
            backward.expand(graph, &forward, &mut best);
        }
    }

    let Some((_, meeting)) = best else {
        return PathOutcome::NoPath;
    };

    // a .. meeting .. b
    let mut nodes = forward.chain_to_origin(&meeting);
    nodes.reverse();
    nodes.extend(backward.chain_to_origin(&meeting).into_iter().skip(1));

    let steps = nodes
        .iter()
        .enumerate()
        .map(|(i, person)| PathStep {
            person: person.clone(),
            relation_to_next: nodes
                .get(i + 1)
                .and_then(|next| graph.edge_between(person, next)),
        })
        .collect();
    PathOutcome::Path { steps }
}

/// A path step decorated with the person's name and a sex-refined
/// relationship label.
#[derive(Debug, Clone, Serialize)]
pub struct LabeledStep {
    pub person: String,
    pub name: String,
    pub relation_to_next: Option<String>,
}

/// Decorate path steps for presentation.
pub fn describe_path(steps: &[PathStep], store: &EntityStore) -> Vec<LabeledStep> {
    steps
        .iter()
        .map(|step| LabeledStep {
            person: step.person.clone(),
            name: store
                .individual(&step.person)
                .map(|i| i.display_name())
                .unwrap_or_else(|| "Unknown".to_string()),
            relation_to_next: step
                .relation_to_next
                .map(|kind| relation_label(kind, &step.person, store).to_string()),
        })
        .collect()
}

/// Sex-refined label for how `from` relates to the next person on the path.
fn relation_label(kind: EdgeKind, from: &str, store: &EntityStore) -> &'static str {
    let sex = store.individual(from).map(|i| i.sex).unwrap_or(Sex::Unknown);
    match (kind, sex) {
        (EdgeKind::SpouseOf, Sex::Male) => "husband_of",
        (EdgeKind::SpouseOf, Sex::Female) => "wife_of",
        (EdgeKind::SpouseOf, Sex::Unknown) => "spouse_of",
        (EdgeKind::ParentOf, Sex::Male) => "father_of",
        (EdgeKind::ParentOf, Sex::Female) => "mother_of",
        (EdgeKind::ParentOf, Sex::Unknown) => "parent_of",
        (EdgeKind::ChildOf, Sex::Male) => "son_of",
        (EdgeKind::ChildOf, Sex::Female) => "daughter_of",
        (EdgeKind::ChildOf, Sex::Unknown) => "child_of",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    fn path_ids(outcome: &PathOutcome) -> Vec<&str> {
        match outcome {
            PathOutcome::Path { steps } => steps.iter().map(|s| s.person.as_str()).collect(),
            PathOutcome::NoPath => panic!("expected a path"),
        }
    }

    #[test]
    fn test_grandparent_path() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        let outcome = shortest_path(&graph, "@I1@", "@I5@");
        assert_eq!(outcome.len(), Some(2));
        assert_eq!(path_ids(&outcome), vec!["@I1@", "@I3@", "@I5@"]);
    }

    #[test]
    fn test_same_person_zero_length() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        let outcome = shortest_path(&graph, "@I1@", "@I1@");
        assert_eq!(outcome.len(), Some(0));
        assert_eq!(path_ids(&outcome), vec!["@I1@"]);
    }

    #[test]
    fn test_symmetry_and_determinism() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        let ab = shortest_path(&graph, "@I1@", "@I5@");
        let ba = shortest_path(&graph, "@I5@", "@I1@");
        assert_eq!(ab.len(), ba.len());

        let again = shortest_path(&graph, "@I1@", "@I5@");
        assert_eq!(ab, again);
    }

    #[test]
    fn test_disconnected_components() {
        let store = fixtures::store(
            &[
                ("@I1@", "A /X/", Sex::Male, None),
                ("@I2@", "B /Y/", Sex::Female, None),
            ],
            &[],
        );
        let graph = RelationGraph::build(&store);
        assert_eq!(shortest_path(&graph, "@I1@", "@I2@"), PathOutcome::NoPath);
    }

    #[test]
    fn test_spouse_edge_preferred_on_tie() {
        // @I1@ and @I2@ are both spouses and co-parents of @I3@: the direct
        // spouse edge (length 1) must win over the two-step path via @I3@.
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        let outcome = shortest_path(&graph, "@I1@", "@I2@");
        assert_eq!(outcome.len(), Some(1));
        match &outcome {
            PathOutcome::Path { steps } => {
                assert_eq!(steps[0].relation_to_next, Some(EdgeKind::SpouseOf))
            }
            PathOutcome::NoPath => panic!("expected a path"),
        }
    }

    #[test]
    fn test_cycle_terminates() {
        // Malformed data: @I3@ recorded as a parent of its own grandparent
        let store = fixtures::store(
            &[
                ("@I1@", "A /X/", Sex::Male, None),
                ("@I2@", "B /X/", Sex::Male, None),
                ("@I3@", "C /X/", Sex::Male, None),
                ("@I4@", "D /Y/", Sex::Female, None),
            ],
            &[
                ("@F1@", Some("@I1@"), None, &["@I2@"]),
                ("@F2@", Some("@I2@"), None, &["@I3@"]),
                ("@F3@", Some("@I3@"), None, &["@I1@"]),
            ],
        );
        let graph = RelationGraph::build(&store);

        let outcome = shortest_path(&graph, "@I1@", "@I3@");
        assert_eq!(outcome.len(), Some(1));
        assert_eq!(shortest_path(&graph, "@I1@", "@I4@"), PathOutcome::NoPath);
    }

    #[test]
    fn test_missing_endpoint_is_no_path() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);
        assert_eq!(shortest_path(&graph, "@I1@", "@I99@"), PathOutcome::NoPath);
    }

    #[test]
    fn test_describe_path_labels() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        let outcome = shortest_path(&graph, "@I1@", "@I5@");
        let steps = match &outcome {
            PathOutcome::Path { steps } => steps,
            PathOutcome::NoPath => panic!("expected a path"),
        };
        let labeled = describe_path(steps, &store);
        assert_eq!(labeled[0].name, "John Smith");
        assert_eq!(labeled[0].relation_to_next.as_deref(), Some("father_of"));
        assert_eq!(labeled[1].relation_to_next.as_deref(), Some("father_of"));
        assert!(labeled[2].relation_to_next.is_none());
    }

    #[test]
    fn test_wife_label() {
        let store = fixtures::three_generations();
        let graph = RelationGraph::build(&store);

        let outcome = shortest_path(&graph, "@I2@", "@I1@");
        let steps = match &outcome {
            PathOutcome::Path { steps } => steps,
            PathOutcome::NoPath => panic!("expected a path"),
        };
        let labeled = describe_path(steps, &store);
        assert_eq!(labeled[0].relation_to_next.as_deref(), Some("wife_of"));
    }
}
