//! Core domain types: input graph records and the output QA dataset.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for conversion job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// GraphRecord (input)
// ---------------------------------------------------------------------------

/// One input line: a graph plus the question asked about it.
///
/// A record is the atomic unit for splitting; it never spans two chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Record identifier (string or number in the source).
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// The graph the question is about.
    pub graph: GraphData,
    /// Natural-language question.
    pub question: String,
    /// Expected answer: a node-id sequence or a scalar.
    #[serde(alias = "expected_answer")]
    pub answer: Value,
    /// Multiple-choice options, when the record is multiple choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    /// Arbitrary passthrough metadata.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

/// The `graph` substructure of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// A graph node with an optional spatial position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(
        default,
        alias = "pos",
        alias = "coordinates",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<Position>,
    #[serde(
        default,
        alias = "label",
        deserialize_with = "deserialize_labels",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub labels: Vec<String>,
}

/// Node position, either `[x, y, (z)]` or `{"x": .., "y": .., "z": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Position {
    Coords(Vec<f64>),
    Named {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        z: Option<f64>,
    },
}

impl Position {
    /// Number of coordinate components.
    pub fn dimensions(&self) -> usize {
        match self {
            Self::Coords(c) => c.len(),
            Self::Named { z: Some(_), .. } => 3,
            Self::Named { .. } => 2,
        }
    }

    /// Coordinate on `axis` (0 = x, 1 = y, 2 = z).
    pub fn axis(&self, axis: usize) -> Option<f64> {
        match self {
            Self::Coords(c) => c.get(axis).copied(),
            Self::Named { x, y, z } => match axis {
                0 => Some(*x),
                1 => Some(*y),
                2 => *z,
                _ => None,
            },
        }
    }
}

/// A graph edge. Weight may be spelled `weight`, `cost`, or `distance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(alias = "source", deserialize_with = "deserialize_id")]
    pub from: String,
    #[serde(alias = "target", deserialize_with = "deserialize_id")]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl Edge {
    /// Build an unweighted edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight: None,
            cost: None,
            distance: None,
        }
    }

    /// Builder-style weight setter.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// The edge's weight under whichever name the source used.
    pub fn weight_value(&self) -> Option<f64> {
        self.weight.or(self.cost).or(self.distance)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or numeric id, found {other}"
        ))),
    }
}

fn deserialize_labels<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect()),
        other => Ok(vec![other.to_string()]),
    }
}

// ---------------------------------------------------------------------------
// QaEntry / Dataset (output)
// ---------------------------------------------------------------------------

/// Shape of a QA entry's correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Sequence,
    Scalar,
    Boolean,
    Object,
}

impl AnswerType {
    /// Derive the tag from a JSON answer.
    pub fn of(answer: &Value) -> Self {
        match answer {
            Value::Array(_) => Self::Sequence,
            Value::Bool(_) => Self::Boolean,
            Value::Object(_) => Self::Object,
            _ => Self::Scalar,
        }
    }
}

/// One question-answer entry of the output corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaEntry {
    pub id: String,
    pub question: String,
    pub answer_type: AnswerType,
    pub correct_answer: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    /// Source record id, graph analysis, and passthrough metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Aggregate counters attached to a finished dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    pub total_entries: usize,
    /// Records that parsed as JSON but could not be converted.
    pub skipped_records: usize,
    /// Lines dropped by the splitter as malformed JSON.
    pub invalid_lines: usize,
    pub by_graph_type: BTreeMap<String, usize>,
    pub by_complexity: BTreeMap<String, usize>,
    pub by_navigation_type: BTreeMap<String, usize>,
}

/// The finished, versioned QA corpus produced by one conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub source_path: String,
    pub entries: Vec<QaEntry>,
    pub statistics: DatasetStatistics,
}
