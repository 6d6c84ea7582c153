//! Accumulates converted entries into the final [`Dataset`].

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use graphqa_shared::{ConversionConfig, Dataset, DatasetStatistics, QaEntry};

/// Metadata keys the converter attaches to every entry.
pub const META_GRAPH_TYPE: &str = "graph_type";
pub const META_NAVIGATION_TYPE: &str = "navigation_type";
pub const META_COMPLEXITY: &str = "complexity";
pub const META_ANALYSIS: &str = "analysis";

#[derive(Debug, Default)]
pub struct DatasetBuilder {
    entries: Vec<QaEntry>,
    stats: DatasetStatistics,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QaEntry) {
        tally(&mut self.stats.by_graph_type, &entry, META_GRAPH_TYPE);
        tally(&mut self.stats.by_complexity, &entry, META_COMPLEXITY);
        tally(&mut self.stats.by_navigation_type, &entry, META_NAVIGATION_TYPE);
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = QaEntry>) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn add_skipped(&mut self, count: usize) {
        self.stats.skipped_records += count;
    }

    pub fn set_invalid_lines(&mut self, count: usize) {
        self.stats.invalid_lines = count;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(mut self, config: &ConversionConfig, source_path: String) -> Dataset {
        self.stats.total_entries = self.entries.len();
        Dataset {
            name: config.dataset_name.clone(),
            version: config.dataset_version.clone(),
            description: config.dataset_description.clone(),
            created_at: Utc::now(),
            source_path,
            entries: self.entries,
            statistics: self.stats,
        }
    }
}

fn tally(counts: &mut BTreeMap<String, usize>, entry: &QaEntry, key: &str) {
    let label = entry
        .metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    *counts.entry(label.to_string()).or_default() += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphqa_shared::AnswerType;

    fn entry(id: &str, graph_type: &str, complexity: &str) -> QaEntry {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_GRAPH_TYPE.into(), Value::from(graph_type));
        metadata.insert(META_COMPLEXITY.into(), Value::from(complexity));
        metadata.insert(META_NAVIGATION_TYPE.into(), Value::from("shortest_path"));
        QaEntry {
            id: id.into(),
            question: "q".into(),
            answer_type: AnswerType::Scalar,
            correct_answer: Value::from(3),
            choices: None,
            metadata,
        }
    }

    #[test]
    fn tallies_by_label() {
        let mut builder = DatasetBuilder::new();
        builder.push(entry("1", "tree", "simple"));
        builder.push(entry("2", "tree", "medium"));
        builder.push(entry("3", "dag", "simple"));
        builder.add_skipped(2);
        builder.set_invalid_lines(1);

        let dataset = builder.finish(&ConversionConfig::default(), "in.jsonl".into());
        let stats = &dataset.statistics;
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.skipped_records, 2);
        assert_eq!(stats.invalid_lines, 1);
        assert_eq!(stats.by_graph_type["tree"], 2);
        assert_eq!(stats.by_graph_type["dag"], 1);
        assert_eq!(stats.by_complexity["simple"], 2);
        assert_eq!(stats.by_navigation_type["shortest_path"], 3);
        assert_eq!(dataset.name, "graph-qa");
    }

    #[test]
    fn missing_label_counts_as_unknown() {
        let mut builder = DatasetBuilder::new();
        let mut e = entry("1", "tree", "simple");
        e.metadata.remove(META_GRAPH_TYPE);
        builder.push(e);
        let dataset = builder.finish(&ConversionConfig::default(), String::new());
        assert_eq!(dataset.statistics.by_graph_type["unknown"], 1);
    }
}
