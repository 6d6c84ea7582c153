//! Post-split checks: chunk re-validation, manifest verification, re-merge.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use graphqa_shared::{GraphQaError, Result};

use crate::manifest::{ChunkInfo, SplitManifest};

/// A well-formed JSON line that is not a graph record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeViolation {
    pub line: usize,
    pub reason: String,
}

/// Outcome of re-reading one chunk file.
#[derive(Debug, Clone, Default)]
pub struct ChunkIntegrityReport {
    pub path: PathBuf,
    /// Non-blank lines in the chunk.
    pub total_lines: usize,
    pub valid_records: usize,
    /// 1-based line numbers (within the chunk) that are not valid JSON.
    pub malformed_lines: Vec<usize>,
    pub shape_violations: Vec<ShapeViolation>,
}

impl ChunkIntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.malformed_lines.is_empty() && self.shape_violations.is_empty()
    }
}

/// Re-read a chunk, re-check every line as JSON, and check each record
/// against the minimal graph-record shape (`id`, `graph.nodes`, `graph.edges`).
pub fn validate_chunk_integrity(chunk_file: &Path) -> Result<ChunkIntegrityReport> {
    let file = File::open(chunk_file).map_err(|e| GraphQaError::io(chunk_file, e))?;
    let mut report = ChunkIntegrityReport {
        path: chunk_file.to_path_buf(),
        ..ChunkIntegrityReport::default()
    };

    for (idx, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line.map_err(|e| GraphQaError::io(chunk_file, e))?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        report.total_lines += 1;

        match serde_json::from_slice::<Value>(&line) {
            Ok(value) => match check_record_shape(&value) {
                Ok(()) => report.valid_records += 1,
                Err(reason) => report.shape_violations.push(ShapeViolation {
                    line: idx + 1,
                    reason,
                }),
            },
            Err(_) => report.malformed_lines.push(idx + 1),
        }
    }

    Ok(report)
}

fn check_record_shape(value: &Value) -> std::result::Result<(), String> {
    let obj = value.as_object().ok_or("record is not a JSON object")?;

    match obj.get("id") {
        Some(Value::String(_) | Value::Number(_)) => {}
        Some(_) => return Err("id must be a string or number".into()),
        None => return Err("missing id".into()),
    }

    let graph = obj
        .get("graph")
        .and_then(Value::as_object)
        .ok_or("missing graph object")?;
    for field in ["nodes", "edges"] {
        if !graph.get(field).is_some_and(Value::is_array) {
            return Err(format!("graph.{field} must be an array"));
        }
    }
    Ok(())
}

/// Whether a chunk file on disk still matches its manifest entry
/// (existence, byte size, SHA-256).
pub fn chunk_matches_manifest(dir: &Path, chunk: &ChunkInfo) -> Result<bool> {
    let path = SplitManifest::chunk_path(dir, chunk);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(GraphQaError::io(&path, e)),
    };
    Ok(bytes.len() as u64 == chunk.size_bytes
        && format!("{:x}", Sha256::digest(&bytes)) == chunk.sha256)
}

/// Result of [`verify_split`].
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub chunks_checked: usize,
    pub missing: Vec<String>,
    /// Chunks whose size or checksum differ from the manifest.
    pub corrupted: Vec<String>,
    pub record_count_sum: usize,
    pub total_objects: usize,
    pub complete: bool,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.complete
            && self.missing.is_empty()
            && self.corrupted.is_empty()
            && self.record_count_sum == self.total_objects
    }
}

/// Check every chunk a manifest lists against the files on disk.
#[instrument(skip_all, fields(manifest = %manifest_path.display()))]
pub fn verify_split(manifest_path: &Path) -> Result<VerifyReport> {
    let manifest = SplitManifest::load(manifest_path)?;
    let dir = manifest_dir(manifest_path);

    let mut report = VerifyReport {
        total_objects: manifest.total_objects,
        complete: manifest.complete,
        ..VerifyReport::default()
    };

    for chunk in &manifest.chunks {
        report.chunks_checked += 1;
        report.record_count_sum += chunk.record_count;

        if !SplitManifest::chunk_path(dir, chunk).exists() {
            report.missing.push(chunk.filename.clone());
        } else if !chunk_matches_manifest(dir, chunk)? {
            report.corrupted.push(chunk.filename.clone());
        }
    }

    if report.is_ok() {
        info!(chunks = report.chunks_checked, "split verified");
    } else {
        warn!(
            missing = report.missing.len(),
            corrupted = report.corrupted.len(),
            complete = report.complete,
            "split verification failed"
        );
    }
    Ok(report)
}

/// Result of [`merge_chunks`].
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub chunks: usize,
    pub records: usize,
    pub bytes_written: u64,
}

/// Concatenate chunks in manifest order into `output`, reversing a split.
#[instrument(skip_all, fields(manifest = %manifest_path.display(), output = %output.display()))]
pub fn merge_chunks(manifest_path: &Path, output: &Path) -> Result<MergeSummary> {
    let manifest = SplitManifest::load(manifest_path)?;
    let dir = manifest_dir(manifest_path);

    let out = File::create(output).map_err(|e| GraphQaError::io(output, e))?;
    let mut writer = BufWriter::new(out);
    let mut bytes_written = 0;

    for chunk in &manifest.chunks {
        let path = SplitManifest::chunk_path(dir, chunk);
        let mut input = File::open(&path).map_err(|e| GraphQaError::io(&path, e))?;
        bytes_written +=
            std::io::copy(&mut input, &mut writer).map_err(|e| GraphQaError::io(output, e))?;
    }
    writer.flush().map_err(|e| GraphQaError::io(output, e))?;

    info!(chunks = manifest.chunks.len(), bytes_written, "chunks merged");

    Ok(MergeSummary {
        chunks: manifest.chunks.len(),
        records: manifest.total_objects,
        bytes_written,
    })
}

fn manifest_dir(manifest_path: &Path) -> &Path {
    manifest_path.parent().unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MANIFEST_FILE_NAME;
    use crate::splitter::{MassiveFileSplitter, SilentSplitProgress, SplitOptions};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("graphqa_{tag}_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const FIXTURE: &str = "../../../fixtures/jsonl/graphs.jsonl";

    #[test]
    fn fixture_chunk_reports_shape_violation() {
        let dir = temp_dir("integrity_fixture");
        let result = MassiveFileSplitter::new(SplitOptions::new(&dir, 1 << 20))
            .unwrap()
            .split(Path::new(FIXTURE), &SilentSplitProgress)
            .unwrap();
        assert_eq!(result.total_chunks, 1);
        assert_eq!(result.metadata.invalid_records, 1);

        let report =
            validate_chunk_integrity(&SplitManifest::chunk_path(&dir, &result.chunks[0])).unwrap();
        assert_eq!(report.total_lines, 7);
        assert_eq!(report.valid_records, 6);
        assert!(report.malformed_lines.is_empty());
        assert_eq!(report.shape_violations.len(), 1);
        assert_eq!(report.shape_violations[0].reason, "missing graph object");
        assert!(!report.is_clean());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn shape_rules() {
        let ok = serde_json::json!({"id": 3, "graph": {"nodes": [], "edges": []}});
        assert!(check_record_shape(&ok).is_ok());

        let no_edges = serde_json::json!({"id": "a", "graph": {"nodes": []}});
        assert_eq!(
            check_record_shape(&no_edges).unwrap_err(),
            "graph.edges must be an array"
        );

        let no_id = serde_json::json!({"graph": {"nodes": [], "edges": []}});
        assert_eq!(check_record_shape(&no_id).unwrap_err(), "missing id");

        assert!(check_record_shape(&serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn verify_detects_tampering_and_merge_restores_source() {
        let dir = temp_dir("integrity_verify");
        let source = dir.join("source.jsonl");
        let lines: Vec<String> = (0..30)
            .map(|i| format!(r#"{{"id": {i}, "graph": {{"nodes": [], "edges": []}}}}"#))
            .collect();
        std::fs::write(&source, lines.join("\n") + "\n").unwrap();

        let out = dir.join("out");
        let result = MassiveFileSplitter::new(SplitOptions::new(&out, 200))
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();
        let manifest_path = out.join(MANIFEST_FILE_NAME);

        let report = verify_split(&manifest_path).unwrap();
        assert!(report.is_ok());
        assert_eq!(report.chunks_checked, result.total_chunks);

        let merged = dir.join("merged.jsonl");
        let summary = merge_chunks(&manifest_path, &merged).unwrap();
        assert_eq!(summary.records, 30);
        assert_eq!(
            std::fs::read(&merged).unwrap(),
            std::fs::read(&source).unwrap()
        );

        // Corrupt one chunk, delete another.
        let first = SplitManifest::chunk_path(&out, &result.chunks[0]);
        std::fs::write(&first, b"{\"id\": 0}\n").unwrap();
        std::fs::remove_file(SplitManifest::chunk_path(&out, &result.chunks[1])).unwrap();

        let report = verify_split(&manifest_path).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.corrupted, vec![result.chunks[0].filename.clone()]);
        assert_eq!(report.missing, vec![result.chunks[1].filename.clone()]);
        assert!(!chunk_matches_manifest(&out, &result.chunks[1]).unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
