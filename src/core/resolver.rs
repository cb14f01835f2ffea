//! Build order computation
//!
//! Depth-first topological sort over a [`DependencyGraph`]. Dependencies
//! always come before their dependents. Cycles do not abort the walk:
//! every distinct cycle encountered is collected and reported together.

use std::collections::HashMap;
use std::hash::Hash;

use crate::core::graph::{DependencyGraph, NodeKey};
use crate::error::CycleDetectedError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Compute the build order of a graph
pub fn topological_sort(graph: &DependencyGraph) -> Result<Vec<NodeKey>, CycleDetectedError> {
    let nodes: Vec<NodeKey> = graph.keys().cloned().collect();
    sort_nodes(&nodes, graph.edges())
}

/// Sort `nodes` so that for every edge `(a, b)` (`a` depends on `b`), `b`
/// precedes `a`.
///
/// Roots are visited in `nodes` order and neighbours in edge order, so the
/// result is deterministic. Edge endpoints missing from `nodes` are ignored.
pub fn sort_nodes<K>(nodes: &[K], edges: &[(K, K)]) -> Result<Vec<K>, CycleDetectedError>
where
    K: Clone + Eq + Hash + ToString,
{
    let index: HashMap<&K, usize> = nodes.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (from, to) in edges {
        if let (Some(&f), Some(&t)) = (index.get(from), index.get(to)) {
            if !adjacency[f].contains(&t) {
                adjacency[f].push(t);
            }
        }
    }

    let mut walk = Walk {
        adjacency: &adjacency,
        marks: vec![Mark::Unvisited; nodes.len()],
        stack: Vec::new(),
        order: Vec::with_capacity(nodes.len()),
        cycles: Vec::new(),
    };
    for start in 0..nodes.len() {
        if walk.marks[start] == Mark::Unvisited {
            walk.visit(start);
        }
    }

    if walk.cycles.is_empty() {
        return Ok(walk.order.into_iter().map(|i| nodes[i].clone()).collect());
    }

    let mut cycles: Vec<Vec<String>> = Vec::new();
    for cycle in walk.cycles {
        let normalized = normalize_cycle(cycle.iter().map(|&i| nodes[i].to_string()).collect());
        if !cycles.contains(&normalized) {
            cycles.push(normalized);
        }
    }
    Err(CycleDetectedError { cycles })
}

struct Walk<'a> {
    adjacency: &'a [Vec<usize>],
    marks: Vec<Mark>,
    stack: Vec<usize>,
    order: Vec<usize>,
    cycles: Vec<Vec<usize>>,
}

impl Walk<'_> {
    fn visit(&mut self, node: usize) {
        self.marks[node] = Mark::InProgress;
        self.stack.push(node);

        let adjacency = self.adjacency;
        for &next in &adjacency[node] {
            match self.marks[next] {
                Mark::Unvisited => self.visit(next),
                Mark::InProgress => {
                    if let Some(pos) = self.stack.iter().position(|&n| n == next) {
                        self.cycles.push(self.stack[pos..].to_vec());
                    }
                }
                Mark::Done => {}
            }
        }

        self.stack.pop();
        self.marks[node] = Mark::Done;
        self.order.push(node);
    }
}

/// Rotate a cycle to start at its smallest key and close it by repeating
/// that key at the end.
fn normalize_cycle(mut cycle: Vec<String>) -> Vec<String> {
    if let Some(min) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        cycle.rotate_left(min);
    }
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    cycle
}
