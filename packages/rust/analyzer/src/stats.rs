//! Structural statistics: degree distribution, spatial extent, edge weights.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use graphqa_shared::{Edge, Node};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegreeStats {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
}

/// Axis-aligned box over the first two coordinates. All zero when no node
/// carries a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub degree: DegreeStats,
    pub bounding_box: BoundingBox,
    pub weights: WeightStats,
}

pub fn compute_statistics(nodes: &[Node], edges: &[Edge]) -> GraphStatistics {
    GraphStatistics {
        degree: degree_stats(nodes, edges),
        bounding_box: bounding_box(nodes),
        weights: weight_stats(edges),
    }
}

/// Degrees over every declared node and every edge endpoint, so isolated
/// nodes contribute a zero.
pub fn degree_stats(nodes: &[Node], edges: &[Edge]) -> DegreeStats {
    let mut degrees: BTreeMap<&str, usize> =
        nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for edge in edges {
        *degrees.entry(&edge.from).or_insert(0) += 1;
        *degrees.entry(&edge.to).or_insert(0) += 1;
    }

    if degrees.is_empty() {
        return DegreeStats::default();
    }

    let mut values: Vec<usize> = degrees.into_values().collect();
    values.sort_unstable();

    let n = values.len();
    let median = if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) as f64 / 2.0
    } else {
        values[n / 2] as f64
    };

    DegreeStats {
        min: values[0],
        max: values[n - 1],
        mean: values.iter().sum::<usize>() as f64 / n as f64,
        median,
    }
}

pub fn bounding_box(nodes: &[Node]) -> BoundingBox {
    let points: Vec<(f64, f64)> = nodes
        .iter()
        .filter_map(|n| n.position.as_ref())
        .filter_map(|p| Some((p.axis(0)?, p.axis(1)?)))
        .collect();

    let Some(&(x0, y0)) = points.first() else {
        return BoundingBox::default();
    };

    points.iter().fold(
        BoundingBox {
            min_x: x0,
            max_x: x0,
            min_y: y0,
            max_y: y0,
        },
        |bb, &(x, y)| BoundingBox {
            min_x: bb.min_x.min(x),
            max_x: bb.max_x.max(x),
            min_y: bb.min_y.min(y),
            max_y: bb.max_y.max(y),
        },
    )
}

pub fn weight_stats(edges: &[Edge]) -> WeightStats {
    let weights: Vec<f64> = edges.iter().filter_map(Edge::weight_value).collect();
    if weights.is_empty() {
        return WeightStats::default();
    }

    let sum: f64 = weights.iter().sum();
    WeightStats {
        count: weights.len(),
        min: weights.iter().copied().fold(f64::INFINITY, f64::min),
        max: weights.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: sum / weights.len() as f64,
        sum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphqa_shared::Position;

    fn node(id: &str, pos: Option<Position>) -> Node {
        Node {
            id: id.into(),
            position: pos,
            labels: vec![],
        }
    }

    #[test]
    fn degrees_include_isolated_nodes() {
        let nodes = vec![node("a", None), node("b", None), node("c", None), node("z", None)];
        let edges = vec![Edge::new("a", "b"), Edge::new("a", "c")];
        let d = degree_stats(&nodes, &edges);
        assert_eq!(d.min, 0);
        assert_eq!(d.max, 2);
        assert_eq!(d.mean, 1.0);
        // sorted degrees: 0, 1, 1, 2
        assert_eq!(d.median, 1.0);
    }

    #[test]
    fn undeclared_endpoints_still_count() {
        let edges = vec![Edge::new("x", "y")];
        let d = degree_stats(&[], &edges);
        assert_eq!((d.min, d.max), (1, 1));
    }

    #[test]
    fn bounding_box_uses_first_two_axes() {
        let nodes = vec![
            node("a", Some(Position::Coords(vec![1.0, -2.0, 100.0]))),
            node("b", Some(Position::Named { x: -3.0, y: 5.0, z: None })),
            node("c", None),
        ];
        let bb = bounding_box(&nodes);
        assert_eq!(
            bb,
            BoundingBox {
                min_x: -3.0,
                max_x: 1.0,
                min_y: -2.0,
                max_y: 5.0
            }
        );
    }

    #[test]
    fn no_positions_gives_zero_box() {
        assert_eq!(bounding_box(&[node("a", None)]), BoundingBox::default());
    }

    #[test]
    fn weight_distribution() {
        let edges = vec![
            Edge::new("a", "b").with_weight(2.0),
            Edge::new("b", "c"),
            Edge {
                cost: Some(4.0),
                ..Edge::new("c", "d")
            },
        ];
        let w = weight_stats(&edges);
        assert_eq!(w.count, 2);
        assert_eq!(w.min, 2.0);
        assert_eq!(w.max, 4.0);
        assert_eq!(w.sum, 6.0);
        assert_eq!(w.mean, 3.0);
    }
}
