//! The split manifest: an ordered index of chunk files plus aggregate counts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use graphqa_shared::fs::write_json_atomic;
use graphqa_shared::{GraphQaError, Result};

/// Current schema version for `manifest.json`.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// File name of the manifest inside a split output directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// How the source was divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// The source fits within one target-sized chunk.
    SingleChunk,
    /// The source is cut at record boundaries near the target size.
    SizeBounded,
}

impl SplitStrategy {
    /// Pick the strategy from the source size alone.
    pub fn for_source(original_size: u64, target_chunk_bytes: u64) -> Self {
        if original_size <= target_chunk_bytes {
            Self::SingleChunk
        } else {
            Self::SizeBounded
        }
    }
}

/// Descriptor of one written chunk. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// 1-based sequence number.
    pub chunk_id: usize,
    /// File name relative to the manifest's directory.
    pub filename: String,
    pub size_bytes: u64,
    pub record_count: usize,
    /// 1-based source line of the first record.
    pub first_line: u64,
    /// 1-based source line of the last record.
    pub last_line: u64,
    /// Hex SHA-256 of the chunk bytes.
    pub sha256: String,
}

/// `manifest.json` written next to the chunk files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub schema_version: u32,
    pub source_path: String,
    pub original_size: u64,
    pub target_chunk_bytes: u64,
    pub strategy: SplitStrategy,
    pub preserve_integrity: bool,
    pub total_chunks: usize,
    /// Records written across all chunks.
    pub total_objects: usize,
    /// Lines dropped as malformed JSON.
    pub invalid_records: usize,
    pub blank_lines: usize,
    pub created_at: DateTime<Utc>,
    /// False while a split is still in progress (or was interrupted).
    pub complete: bool,
    pub chunks: Vec<ChunkInfo>,
}

impl SplitManifest {
    /// Start an empty, incomplete manifest.
    pub fn new(
        source_path: &Path,
        original_size: u64,
        target_chunk_bytes: u64,
        preserve_integrity: bool,
    ) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            source_path: source_path.display().to_string(),
            original_size,
            target_chunk_bytes,
            strategy: SplitStrategy::for_source(original_size, target_chunk_bytes),
            preserve_integrity,
            total_chunks: 0,
            total_objects: 0,
            invalid_records: 0,
            blank_lines: 0,
            created_at: Utc::now(),
            complete: false,
            chunks: Vec::new(),
        }
    }

    /// Append a chunk and keep the aggregate counts in step.
    pub fn push_chunk(&mut self, chunk: ChunkInfo) {
        self.total_objects += chunk.record_count;
        self.chunks.push(chunk);
        self.total_chunks = self.chunks.len();
    }

    /// Load and check a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| GraphQaError::io(path, e))?;
        let manifest: Self = serde_json::from_slice(&content).map_err(|e| {
            GraphQaError::parse(format!("invalid manifest {}: {e}", path.display()))
        })?;

        if manifest.schema_version > MANIFEST_SCHEMA_VERSION {
            return Err(GraphQaError::validation(format!(
                "manifest schema_version {} not supported",
                manifest.schema_version
            )));
        }
        Ok(manifest)
    }

    /// Write the manifest atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Absolute path of a chunk, given the directory holding the manifest.
    pub fn chunk_path(dir: &Path, chunk: &ChunkInfo) -> PathBuf {
        dir.join(&chunk.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: usize, records: usize) -> ChunkInfo {
        ChunkInfo {
            chunk_id: id,
            filename: format!("chunk_{id:05}.jsonl"),
            size_bytes: 100,
            record_count: records,
            first_line: 1,
            last_line: records as u64,
            sha256: "00".into(),
        }
    }

    #[test]
    fn strategy_from_size() {
        assert_eq!(SplitStrategy::for_source(10, 10), SplitStrategy::SingleChunk);
        assert_eq!(SplitStrategy::for_source(11, 10), SplitStrategy::SizeBounded);
    }

    #[test]
    fn push_chunk_updates_totals() {
        let mut manifest = SplitManifest::new(Path::new("in.jsonl"), 300, 100, true);
        manifest.push_chunk(chunk(1, 4));
        manifest.push_chunk(chunk(2, 3));
        assert_eq!(manifest.total_chunks, 2);
        assert_eq!(manifest.total_objects, 7);
    }

    #[test]
    fn save_and_load() {
        let dir = std::env::temp_dir().join(format!("graphqa_manifest_{}", uuid::Uuid::now_v7()));
        let path = dir.join(MANIFEST_FILE_NAME);

        let mut manifest = SplitManifest::new(Path::new("in.jsonl"), 300, 100, true);
        manifest.push_chunk(chunk(1, 4));
        manifest.save(&path).expect("save");

        let loaded = SplitManifest::load(&path).expect("load");
        assert_eq!(loaded, manifest);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn future_schema_is_rejected() {
        let dir = std::env::temp_dir().join(format!("graphqa_manifest_{}", uuid::Uuid::now_v7()));
        let path = dir.join(MANIFEST_FILE_NAME);
        let mut manifest = SplitManifest::new(Path::new("in.jsonl"), 1, 1, true);
        manifest.schema_version = MANIFEST_SCHEMA_VERSION + 1;
        manifest.save(&path).unwrap();

        let err = SplitManifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("not supported"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
