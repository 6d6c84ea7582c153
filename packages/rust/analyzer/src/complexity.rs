//! Complexity tier assessment.

use serde::{Deserialize, Serialize};

use graphqa_shared::{Edge, Node};

use crate::classify::{is_directed, observed_spatial_dimensions};

const SIMPLE_MAX_NODES: usize = 10;
const SIMPLE_MAX_EDGES: usize = 15;
const MEDIUM_MAX_NODES: usize = 50;
const MEDIUM_MAX_EDGES: usize = 100;

/// Complexity tier. Ordered so `max` picks the more severe tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combine the size bucket with the property bucket, keeping the more
/// severe of the two.
pub fn assess_complexity(nodes: &[Node], edges: &[Edge]) -> Complexity {
    size_bucket(nodes.len(), edges.len()).max(property_bucket(nodes, edges))
}

fn size_bucket(node_count: usize, edge_count: usize) -> Complexity {
    if node_count <= SIMPLE_MAX_NODES && edge_count <= SIMPLE_MAX_EDGES {
        Complexity::Simple
    } else if node_count <= MEDIUM_MAX_NODES && edge_count <= MEDIUM_MAX_EDGES {
        Complexity::Medium
    } else {
        Complexity::Complex
    }
}

/// One point each for weights, direction, and more than two spatial axes.
fn property_bucket(nodes: &[Node], edges: &[Edge]) -> Complexity {
    let points = [
        edges.iter().any(|e| e.weight_value().is_some()),
        is_directed(edges),
        observed_spatial_dimensions(nodes) > 2,
    ]
    .into_iter()
    .filter(|&p| p)
    .count();

    match points {
        0 => Complexity::Simple,
        1 => Complexity::Medium,
        _ => Complexity::Complex,
    }
}
