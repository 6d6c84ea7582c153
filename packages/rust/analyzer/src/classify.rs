//! Graph-type classification.
//!
//! Precedence is fixed: spatial grid, then weighted, then directed (DAG or
//! cyclic), then tree, then general. The thresholds below were calibrated
//! against the existing dataset family and must not drift, or previously
//! produced labels stop reproducing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use graphqa_shared::{Edge, Node};

/// An edge set is directed when fewer than this share of its distinct
/// `(from, to)` pairs have a matching reverse pair.
pub const REVERSE_PAIR_THRESHOLD: f64 = 0.30;

/// Share of declared nodes that must be reachable for a tree.
pub const TREE_COVERAGE_THRESHOLD: f64 = 0.80;

/// Nodes inspected for spatial positions.
pub const NODE_SAMPLE_SIZE: usize = 10;

/// Structural family of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphType {
    SpatialGrid,
    Weighted,
    Dag,
    Directed,
    Tree,
    /// Label carried by some source datasets; never inferred.
    Planar,
    General,
}

impl GraphType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpatialGrid => "spatial_grid",
            Self::Weighted => "weighted",
            Self::Dag => "dag",
            Self::Directed => "directed",
            Self::Tree => "tree",
            Self::Planar => "planar",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for GraphType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a graph. Deterministic and independent of edge-list order.
pub fn classify_graph_type(nodes: &[Node], edges: &[Edge]) -> GraphType {
    if observed_spatial_dimensions(nodes) >= 2 {
        return GraphType::SpatialGrid;
    }

    if edges.iter().any(|e| e.weight_value().is_some()) {
        return GraphType::Weighted;
    }

    if is_directed(edges) {
        return if has_cycle(edges) {
            GraphType::Directed
        } else {
            GraphType::Dag
        };
    }

    if undirected_edge_count(edges) + 1 == nodes.len()
        && reachable_fraction(nodes, edges) >= TREE_COVERAGE_THRESHOLD
    {
        return GraphType::Tree;
    }

    GraphType::General
}

/// Number of coordinate axes that actually vary across the node sample.
///
/// Only positions with at least two components count. A set of nodes laid
/// out on a single line reports 1, so it is not treated as a grid.
pub fn observed_spatial_dimensions(nodes: &[Node]) -> usize {
    let positions: Vec<_> = nodes
        .iter()
        .take(NODE_SAMPLE_SIZE)
        .filter_map(|n| n.position.as_ref())
        .filter(|p| p.dimensions() >= 2)
        .collect();

    let max_dims = positions.iter().map(|p| p.dimensions()).max().unwrap_or(0);

    (0..max_dims)
        .filter(|&axis| {
            let mut values = positions
                .iter()
                .filter_map(|p| p.axis(axis))
                .filter(|v| v.is_finite());
            match values.next() {
                Some(first) => values.any(|v| v != first),
                None => false,
            }
        })
        .count()
}

/// Whether the edge set reads as directed (few reverse pairs).
pub fn is_directed(edges: &[Edge]) -> bool {
    let pairs: HashSet<(&str, &str)> = edges
        .iter()
        .filter(|e| e.from != e.to)
        .map(|e| (e.from.as_str(), e.to.as_str()))
        .collect();

    if pairs.is_empty() {
        return false;
    }

    let reversed = pairs
        .iter()
        .filter(|(from, to)| pairs.contains(&(*to, *from)))
        .count();

    (reversed as f64 / pairs.len() as f64) < REVERSE_PAIR_THRESHOLD
}

/// Distinct unordered endpoint pairs; an edge listed in both directions
/// counts once.
fn undirected_edge_count(edges: &[Edge]) -> usize {
    edges
        .iter()
        .map(|e| {
            if e.from <= e.to {
                (e.from.as_str(), e.to.as_str())
            } else {
                (e.to.as_str(), e.from.as_str())
            }
        })
        .collect::<BTreeSet<_>>()
        .len()
}

/// Share of declared node ids reachable from the first declared node,
/// following edges in either direction.
fn reachable_fraction(nodes: &[Node], edges: &[Edge]) -> f64 {
    let Some(start) = nodes.first() else {
        return 0.0;
    };

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency.entry(&edge.from).or_default().push(&edge.to);
        adjacency.entry(&edge.to).or_default().push(&edge.from);
    }

    let mut seen: HashSet<&str> = HashSet::from([start.id.as_str()]);
    let mut queue = VecDeque::from([start.id.as_str()]);
    while let Some(current) = queue.pop_front() {
        for &next in adjacency.get(current).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }

    let declared: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let reached = declared.iter().filter(|id| seen.contains(*id)).count();
    reached as f64 / declared.len() as f64
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Depth-first back-edge search with an explicit stack, so deep graphs
/// cannot overflow the call stack.
fn has_cycle(edges: &[Edge]) -> bool {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in edges {
        adjacency.entry(&edge.from).or_default().push(&edge.to);
        adjacency.entry(&edge.to).or_default();
    }
    for targets in adjacency.values_mut() {
        targets.sort_unstable();
    }

    let mut state: HashMap<&str, Visit> = HashMap::new();

    for &root in adjacency.keys() {
        if state.contains_key(root) {
            continue;
        }
        state.insert(root, Visit::InProgress);
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let next = adjacency.get(node).and_then(|t| t.get(frame.1)).copied();
            match next {
                Some(child) => {
                    frame.1 += 1;
                    match state.get(child) {
                        Some(Visit::InProgress) => return true,
                        Some(Visit::Done) => {}
                        None => {
                            state.insert(child, Visit::InProgress);
                            stack.push((child, 0));
                        }
                    }
                }
                None => {
                    state.insert(node, Visit::Done);
                    stack.pop();
                }
            }
        }
    }

    false
}
