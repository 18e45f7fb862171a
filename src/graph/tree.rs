//! Bounded ancestor/descendant tree enumeration.
//!
//! Recursion is bounded by an explicit generation count and guarded by the
//! current path: a node met again along its own branch is emitted as a
//! cycle-flagged leaf instead of being silently dropped, so callers can
//! detect malformed data.

use crate::graph::RelationGraph;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub depth: u32,
    /// True when this node was reached again along its own branch and
    /// enumeration was cut here.
    pub cycle: bool,
    /// Parent branches for ancestor trees, child branches for descendant
    /// trees. Blended families can yield more than two branches.
    pub branches: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tree {
    pub root: TreeNode,
    pub generations: u32,
    /// True when any branch was cycle-pruned during enumeration.
    pub malformed_data: bool,
}

enum Direction {
    Ancestors,
    Descendants,
}

/// Enumerate ancestors of `id` up to `generations` levels.
pub fn ancestor_tree(graph: &RelationGraph, id: &str, generations: u32) -> Tree {
    build_tree(graph, id, generations, Direction::Ancestors)
}

/// Enumerate descendants of `id` up to `generations` levels.
pub fn descendant_tree(graph: &RelationGraph, id: &str, generations: u32) -> Tree {
    build_tree(graph, id, generations, Direction::Descendants)
}

fn build_tree(graph: &RelationGraph, id: &str, generations: u32, direction: Direction) -> Tree {
    let mut path = HashSet::new();
    let mut malformed = false;
    let root = build_node(graph, id, 0, generations, &direction, &mut path, &mut malformed);
    Tree {
        root,
        generations,
        malformed_data: malformed,
    }
}

fn build_node(
    graph: &RelationGraph,
    id: &str,
    depth: u32,
    limit: u32,
    direction: &Direction,
    path: &mut HashSet<String>,
    malformed: &mut bool,
) -> TreeNode {
    if path.contains(id) {
        *malformed = true;
        return TreeNode {
            id: id.to_string(),
            depth,
            cycle: true,
            branches: Vec::new(),
        };
    }

    let mut branches = Vec::new();
    if depth < limit {
        path.insert(id.to_string());
        let next: Vec<String> = match direction {
            Direction::Ancestors => graph.parents(id).map(str::to_string).collect(),
            Direction::Descendants => graph.children(id).map(str::to_string).collect(),
        };
        for relative in next {
            branches.push(build_node(
                graph,
                &relative,
                depth + 1,
                limit,
                direction,
                path,
                malformed,
            ));
        }
        path.remove(id);
    }

    TreeNode {
        id: id.to_string(),
        depth,
        cycle: false,
        branches,
    }
}

impl Tree {
    /// Flatten to (id, depth) pairs in enumeration order, root included.
    pub fn flatten(&self) -> Vec<(&str, u32)> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            out.push((node.id.as_str(), node.depth));
            for branch in node.branches.iter().rev() {
                stack.push(branch);
            }
        }
        out
    }
}
