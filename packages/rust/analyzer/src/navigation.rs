//! Navigation-type inference from question text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of traversal a question asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationType {
    ShortestPath,
    LongestPath,
    OptimalPath,
    AllPaths,
    Dijkstra,
    AStar,
    BreadthFirst,
    DepthFirst,
    BellmanFord,
    FloydWarshall,
    General,
}

impl NavigationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortestPath => "shortest_path",
            Self::LongestPath => "longest_path",
            Self::OptimalPath => "optimal_path",
            Self::AllPaths => "all_paths",
            Self::Dijkstra => "dijkstra",
            Self::AStar => "a_star",
            Self::BreadthFirst => "breadth_first",
            Self::DepthFirst => "depth_first",
            Self::BellmanFord => "bellman_ford",
            Self::FloydWarshall => "floyd_warshall",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for NavigationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first match wins.
static KEYWORDS: LazyLock<Vec<(Regex, NavigationType)>> = LazyLock::new(|| {
    [
        (r"\ball (possible |simple )?(paths|routes)\b", NavigationType::AllPaths),
        (r"\b(shortest|minimum[- ]length|fewest (steps|hops|edges))\b", NavigationType::ShortestPath),
        (r"\b(longest|maximum[- ]length)\b", NavigationType::LongestPath),
        (r"\b(optimal|best|cheapest|minimum[- ]cost|lowest[- ]cost)\b", NavigationType::OptimalPath),
        (r"\bdijkstra'?s?\b", NavigationType::Dijkstra),
        (r"(\ba\*|\ba-star\b|\bastar\b)", NavigationType::AStar),
        (r"\b(bfs|breadth[- ]first)\b", NavigationType::BreadthFirst),
        (r"\b(dfs|depth[- ]first)\b", NavigationType::DepthFirst),
        (r"\bbellman[- ]ford\b", NavigationType::BellmanFord),
        (r"\bfloyd[- ]warshall\b", NavigationType::FloydWarshall),
    ]
    .into_iter()
    .map(|(pattern, nav)| {
        let re = Regex::new(&format!("(?i){pattern}")).expect("valid regex");
        (re, nav)
    })
    .collect()
});

/// Infer the navigation type from a question and its expected answer.
///
/// Without a keyword, a multi-element sequence answer is read as a path and
/// defaults to shortest-path.
pub fn infer_navigation_type(question: &str, answer: &Value) -> NavigationType {
    if let Some((_, nav)) = KEYWORDS.iter().find(|(re, _)| re.is_match(question)) {
        return *nav;
    }

    match answer {
        Value::Array(items) if items.len() > 1 => NavigationType::ShortestPath,
        _ => NavigationType::General,
    }
}
