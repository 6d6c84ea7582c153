//! Stateless graph analysis for QA records.
//!
//! Every function here is pure over a `(nodes, edges)` pair (plus the
//! question/answer for navigation inference), so records can be analyzed on
//! any thread in any order. This crate provides:
//! - [`classify`]: graph-type classification
//! - [`navigation`]: navigation-type inference from question text
//! - [`complexity`]: complexity tier assessment
//! - [`stats`]: degree, spatial and edge-weight statistics

pub mod classify;
pub mod complexity;
pub mod navigation;
pub mod stats;

use serde::{Deserialize, Serialize};

use graphqa_shared::GraphRecord;

pub use classify::{
    GraphType, NODE_SAMPLE_SIZE, REVERSE_PAIR_THRESHOLD, TREE_COVERAGE_THRESHOLD,
    classify_graph_type, is_directed, observed_spatial_dimensions,
};
pub use complexity::{Complexity, assess_complexity};
pub use navigation::{NavigationType, infer_navigation_type};
pub use stats::{BoundingBox, DegreeStats, GraphStatistics, WeightStats, compute_statistics};

/// Everything the analyzer derives for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub graph_type: GraphType,
    pub navigation_type: NavigationType,
    pub complexity: Complexity,
    pub node_count: usize,
    pub edge_count: usize,
    pub directed: bool,
    pub spatial_dimensions: usize,
    pub statistics: GraphStatistics,
}

/// Run every analysis over a record.
pub fn analyze_record(record: &GraphRecord) -> AnalysisResult {
    let nodes = &record.graph.nodes;
    let edges = &record.graph.edges;

    AnalysisResult {
        graph_type: classify_graph_type(nodes, edges),
        navigation_type: infer_navigation_type(&record.question, &record.answer),
        complexity: assess_complexity(nodes, edges),
        node_count: nodes.len(),
        edge_count: edges.len(),
        directed: is_directed(edges),
        spatial_dimensions: observed_spatial_dimensions(nodes),
        statistics: compute_statistics(nodes, edges),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture_records() -> Vec<GraphRecord> {
        let path = "../../../fixtures/jsonl/graphs.jsonl";
        let content =
            std::fs::read_to_string(path).unwrap_or_else(|_| panic!("missing fixture: {path}"));
        content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    #[test]
    fn fixture_records_cover_every_inferred_type() {
        let records = load_fixture_records();
        let types: Vec<GraphType> = records
            .iter()
            .map(|r| analyze_record(r).graph_type)
            .collect();

        for expected in [
            GraphType::SpatialGrid,
            GraphType::Weighted,
            GraphType::Dag,
            GraphType::Directed,
            GraphType::Tree,
            GraphType::General,
        ] {
            assert!(types.contains(&expected), "no fixture classified as {expected}");
        }
    }

    #[test]
    fn analysis_counts_match_record() {
        let record: GraphRecord = serde_json::from_str(
            r#"{"id": "r1", "graph": {"nodes": [{"id": "a"}, {"id": "b"}], "edges": [{"from": "a", "to": "b"}]},
                "question": "What is the shortest path from a to b?", "answer": ["a", "b"]}"#,
        )
        .unwrap();

        let result = analyze_record(&record);
        assert_eq!(result.node_count, 2);
        assert_eq!(result.edge_count, 1);
        assert_eq!(result.navigation_type, NavigationType::ShortestPath);
        assert_eq!(result.complexity, Complexity::Medium);
        assert_eq!(result.statistics.degree.max, 1);
    }
}
