//! Streaming, record-safe file splitter.
//!
//! The source is read one line at a time and never held in memory as a
//! whole. Only the chunk currently being filled is buffered. A chunk is
//! flushed when the next record would push it past the target size, so a
//! chunk exceeds the target by at most one record and no record is cut.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::de::IgnoredAny;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use graphqa_shared::{GraphQaError, Result};

use crate::manifest::{ChunkInfo, MANIFEST_FILE_NAME, SplitManifest, SplitStrategy};

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Options for one split run.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Soft upper bound per chunk.
    pub target_chunk_bytes: u64,
    /// Parse each line as JSON and drop the ones that fail.
    pub preserve_integrity: bool,
    /// Rewrite the manifest after every chunk so an interrupted split
    /// leaves a usable partial index.
    pub enable_checkpointing: bool,
    /// Directory receiving chunk files and `manifest.json`.
    pub output_dir: PathBuf,
    /// Chunk file name prefix (`<prefix>_00001.jsonl`).
    pub chunk_prefix: String,
    /// Log and report every N chunks.
    pub progress_every_chunks: usize,
    /// Log and report every N source lines.
    pub progress_every_lines: u64,
}

impl SplitOptions {
    pub fn new(output_dir: impl Into<PathBuf>, target_chunk_bytes: u64) -> Self {
        Self {
            target_chunk_bytes,
            preserve_integrity: true,
            enable_checkpointing: true,
            output_dir: output_dir.into(),
            chunk_prefix: "chunk".into(),
            progress_every_chunks: 10,
            progress_every_lines: 100_000,
        }
    }
}

/// Result of a split.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub chunks: Vec<ChunkInfo>,
    pub total_chunks: usize,
    pub total_objects: usize,
    pub original_size: u64,
    pub metadata: SplitMetadata,
}

#[derive(Debug, Clone)]
pub struct SplitMetadata {
    pub strategy: SplitStrategy,
    pub invalid_records: usize,
    pub blank_lines: usize,
    pub lines_read: u64,
    pub manifest_path: PathBuf,
    pub elapsed: std::time::Duration,
}

/// Progress callbacks. Chunk and line signals fire independently: chunks are
/// the coarse signal, lines the liveness one.
pub trait SplitProgress: Send + Sync {
    /// Called after each chunk file is written.
    fn chunk_written(&self, chunk: &ChunkInfo);
    /// Called every `progress_every_lines` source lines.
    fn lines_scanned(&self, lines: u64, bytes_read: u64, total_bytes: u64);
}

/// No-op progress for headless/test usage.
pub struct SilentSplitProgress;

impl SplitProgress for SilentSplitProgress {
    fn chunk_written(&self, _chunk: &ChunkInfo) {}
    fn lines_scanned(&self, _lines: u64, _bytes_read: u64, _total_bytes: u64) {}
}

/// Records accumulated for the chunk being filled.
#[derive(Default)]
struct ChunkBuffer {
    bytes: Vec<u8>,
    records: usize,
    first_line: u64,
    last_line: u64,
}

impl ChunkBuffer {
    fn is_empty(&self) -> bool {
        self.records == 0
    }

    fn push(&mut self, record: &[u8], line_no: u64) {
        if self.records == 0 {
            self.first_line = line_no;
        }
        self.bytes.extend_from_slice(record);
        self.bytes.push(b'\n');
        self.records += 1;
        self.last_line = line_no;
    }
}

/// Splits oversized JSONL files into record-aligned chunks.
pub struct MassiveFileSplitter {
    options: SplitOptions,
}

impl MassiveFileSplitter {
    pub fn new(options: SplitOptions) -> Result<Self> {
        if options.target_chunk_bytes == 0 {
            return Err(GraphQaError::config("target_chunk_bytes must be > 0"));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    /// Split `source` into chunk files plus a manifest in the output dir.
    ///
    /// Chunk files with this prefix left in the output dir by an earlier split
    /// are deleted first. Other files there are left alone.
    ///
    /// Fails before writing anything if the source cannot be opened. A chunk
    /// write failure is fatal; with checkpointing on, the manifest written
    /// so far stays on disk.
    #[instrument(skip_all, fields(source = %source.display(), target = self.options.target_chunk_bytes))]
    pub fn split(&self, source: &Path, progress: &dyn SplitProgress) -> Result<SplitResult> {
        let start = Instant::now();
        let opts = &self.options;

        let file = File::open(source).map_err(|e| GraphQaError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        })?;
        let original_size = file
            .metadata()
            .map_err(|e| GraphQaError::SourceUnreadable {
                path: source.to_path_buf(),
                source: e,
            })?
            .len();

        std::fs::create_dir_all(&opts.output_dir)
            .map_err(|e| GraphQaError::io(&opts.output_dir, e))?;
        let stale = remove_chunk_files(&opts.output_dir, &opts.chunk_prefix)?;
        if stale > 0 {
            debug!(stale, "removed chunk files from an earlier split");
        }

        let manifest_path = opts.output_dir.join(MANIFEST_FILE_NAME);
        let mut manifest = SplitManifest::new(
            source,
            original_size,
            opts.target_chunk_bytes,
            opts.preserve_integrity,
        );

        info!(
            original_size,
            strategy = ?manifest.strategy,
            preserve_integrity = opts.preserve_integrity,
            "starting split"
        );

        let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        let mut line = Vec::new();
        let mut line_no: u64 = 0;
        let mut bytes_read: u64 = 0;
        let mut buffer = ChunkBuffer::default();

        loop {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| GraphQaError::SourceUnreadable {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            if n == 0 {
                break;
            }
            line_no += 1;
            bytes_read += n as u64;

            if opts.progress_every_lines > 0 && line_no % opts.progress_every_lines == 0 {
                debug!(lines = line_no, bytes_read, "split progress");
                progress.lines_scanned(line_no, bytes_read, original_size);
            }

            let record = trim_line_ending(&line);
            if record.iter().all(u8::is_ascii_whitespace) {
                manifest.blank_lines += 1;
                continue;
            }

            if opts.preserve_integrity
                && serde_json::from_slice::<IgnoredAny>(record).is_err()
            {
                manifest.invalid_records += 1;
                debug!(line = line_no, "skipping malformed record");
                continue;
            }

            let width = record.len() as u64 + 1;
            if !buffer.is_empty() && buffer.bytes.len() as u64 + width > opts.target_chunk_bytes {
                self.flush(&mut buffer, &mut manifest, &manifest_path, progress)?;
            }
            buffer.push(record, line_no);
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer, &mut manifest, &manifest_path, progress)?;
        }

        manifest.complete = true;
        manifest.save(&manifest_path)?;

        let elapsed = start.elapsed();
        info!(
            chunks = manifest.total_chunks,
            records = manifest.total_objects,
            invalid = manifest.invalid_records,
            lines = line_no,
            elapsed_ms = elapsed.as_millis(),
            "split complete"
        );

        Ok(SplitResult {
            total_chunks: manifest.total_chunks,
            total_objects: manifest.total_objects,
            original_size,
            metadata: SplitMetadata {
                strategy: manifest.strategy,
                invalid_records: manifest.invalid_records,
                blank_lines: manifest.blank_lines,
                lines_read: line_no,
                manifest_path,
                elapsed,
            },
            chunks: manifest.chunks,
        })
    }

    fn flush(
        &self,
        buffer: &mut ChunkBuffer,
        manifest: &mut SplitManifest,
        manifest_path: &Path,
        progress: &dyn SplitProgress,
    ) -> Result<()> {
        let chunk_id = manifest.chunks.len() + 1;
        let filename = format!("{}_{chunk_id:05}.jsonl", self.options.chunk_prefix);
        let path = self.options.output_dir.join(&filename);

        std::fs::write(&path, &buffer.bytes)
            .map_err(|e| GraphQaError::ChunkWrite { path: path.clone(), source: e })?;

        let info = ChunkInfo {
            chunk_id,
            filename,
            size_bytes: buffer.bytes.len() as u64,
            record_count: buffer.records,
            first_line: buffer.first_line,
            last_line: buffer.last_line,
            sha256: format!("{:x}", Sha256::digest(&buffer.bytes)),
        };
        debug!(
            chunk_id,
            size = info.size_bytes,
            records = info.record_count,
            "chunk written"
        );

        progress.chunk_written(&info);
        manifest.push_chunk(info);
        *buffer = ChunkBuffer::default();

        if self.options.enable_checkpointing {
            manifest.save(manifest_path)?;
        }
        if self.options.progress_every_chunks > 0 && chunk_id % self.options.progress_every_chunks == 0 {
            info!(chunks = chunk_id, records = manifest.total_objects, "split progress");
        }
        Ok(())
    }
}

/// Delete `<prefix>_NNNNN.jsonl` files in `dir`. Returns how many were removed.
fn remove_chunk_files(dir: &Path, prefix: &str) -> Result<usize> {
    let entries = std::fs::read_dir(dir).map_err(|e| GraphQaError::io(dir, e))?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| GraphQaError::io(dir, e))?;
        let name = entry.file_name();
        let is_chunk = name
            .to_str()
            .and_then(|n| n.strip_prefix(prefix))
            .and_then(|n| n.strip_prefix('_'))
            .and_then(|n| n.strip_suffix(".jsonl"))
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()));
        if is_chunk {
            let path = entry.path();
            std::fs::remove_file(&path).map_err(|e| GraphQaError::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Strip one trailing `\n` and then one `\r`.
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("graphqa_{tag}_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record_line(i: usize, pad: usize) -> String {
        format!(
            r#"{{"id": "r{i}", "graph": {{"nodes": [{{"id": "a"}}, {{"id": "b"}}], "edges": [{{"from": "a", "to": "b"}}]}}, "question": "q{i}", "answer": ["a", "b"], "pad": "{}"}}"#,
            "x".repeat(pad)
        )
    }

    fn write_source(dir: &Path, lines: &[String]) -> PathBuf {
        let path = dir.join("source.jsonl");
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    fn concat_chunks(dir: &Path, result: &SplitResult) -> Vec<String> {
        result
            .chunks
            .iter()
            .flat_map(|c| {
                std::fs::read_to_string(SplitManifest::chunk_path(dir, c))
                    .unwrap()
                    .lines()
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn chunks_reproduce_valid_lines_in_order() {
        let dir = temp_dir("split_atomic");
        let mut lines: Vec<String> = (0..40).map(|i| record_line(i, i * 7 % 50)).collect();
        lines.insert(5, "{not json".into());
        lines.insert(17, String::new());
        lines.insert(30, r#"{"truncated": "#.into());
        let source = write_source(&dir, &lines);

        let expected: Vec<String> = lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .filter(|l| serde_json::from_str::<serde_json::Value>(l).is_ok())
            .cloned()
            .collect();

        for target in [1, 200, 512, 1500, 1 << 20] {
            let out = dir.join(format!("out_{target}"));
            let splitter = MassiveFileSplitter::new(SplitOptions::new(&out, target)).unwrap();
            let result = splitter.split(&source, &SilentSplitProgress).expect("split");

            assert_eq!(concat_chunks(&out, &result), expected, "target {target}");
            assert_eq!(result.total_objects, expected.len());
            assert_eq!(result.metadata.invalid_records, 2);
            assert_eq!(result.metadata.blank_lines, 1);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn chunk_sizes_stay_within_one_record_of_target() {
        let dir = temp_dir("split_bound");
        let lines: Vec<String> = (0..60).map(|i| record_line(i, (i * 31) % 120)).collect();
        let source = write_source(&dir, &lines);
        let max_width = lines.iter().map(|l| l.len() as u64 + 1).max().unwrap();

        let target = 700;
        let out = dir.join("out");
        let result = MassiveFileSplitter::new(SplitOptions::new(&out, target))
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();

        assert!(result.total_chunks > 1);
        for chunk in &result.chunks {
            let content = std::fs::read(SplitManifest::chunk_path(&out, chunk)).unwrap();
            assert_eq!(content.len() as u64, chunk.size_bytes);
            let first_width = content.iter().position(|&b| b == b'\n').unwrap() as u64 + 1;
            assert!(chunk.size_bytes >= first_width);
            assert!(chunk.size_bytes <= target + max_width);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn resplit_into_same_dir_drops_old_chunks() {
        let dir = temp_dir("split_resplit");
        let lines: Vec<String> = (0..20).map(|i| record_line(i, 40)).collect();
        let source = write_source(&dir, &lines);
        let out = dir.join("out");

        let many = MassiveFileSplitter::new(SplitOptions::new(&out, 300))
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();
        assert!(many.total_chunks > 3);
        std::fs::write(out.join("notes.jsonl"), b"kept\n").unwrap();

        let one = MassiveFileSplitter::new(SplitOptions::new(&out, 1 << 20))
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();
        assert_eq!(one.total_chunks, 1);

        let mut names: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["chunk_00001.jsonl", MANIFEST_FILE_NAME, "notes.jsonl"]);
        assert_eq!(concat_chunks(&out, &one), lines);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn line_endings_are_trimmed_once() {
        assert_eq!(trim_line_ending(b"{}\r\n"), b"{}");
        assert_eq!(trim_line_ending(b"{}\n"), b"{}");
        assert_eq!(trim_line_ending(b"{}"), b"{}");
        assert_eq!(trim_line_ending(b"{}\n\n"), b"{}\n");
    }

    #[test]
    fn line_ranges_follow_the_source() {
        let dir = temp_dir("split_ranges");
        let lines: Vec<String> = (0..10).map(|i| record_line(i, 0)).collect();
        let source = write_source(&dir, &lines);
        let width = lines[0].len() as u64 + 1;

        let out = dir.join("out");
        let result = MassiveFileSplitter::new(SplitOptions::new(&out, width * 3))
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();

        let ranges: Vec<(u64, u64)> = result.chunks.iter().map(|c| (c.first_line, c.last_line)).collect();
        assert_eq!(ranges, vec![(1, 3), (4, 6), (7, 9), (10, 10)]);
        assert_eq!(result.metadata.strategy, SplitStrategy::SizeBounded);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn without_integrity_malformed_lines_pass_through() {
        let dir = temp_dir("split_raw");
        let lines = vec![record_line(0, 0), "{broken".to_string(), record_line(1, 0)];
        let source = write_source(&dir, &lines);

        let mut opts = SplitOptions::new(dir.join("out"), 1 << 20);
        opts.preserve_integrity = false;
        let result = MassiveFileSplitter::new(opts)
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();

        assert_eq!(result.total_objects, 3);
        assert_eq!(result.metadata.invalid_records, 0);
        assert_eq!(result.metadata.strategy, SplitStrategy::SingleChunk);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_source_writes_nothing() {
        let dir = temp_dir("split_missing");
        let out = dir.join("out");
        let err = MassiveFileSplitter::new(SplitOptions::new(&out, 100))
            .unwrap()
            .split(&dir.join("nope.jsonl"), &SilentSplitProgress)
            .unwrap_err();

        assert!(matches!(err, GraphQaError::SourceUnreadable { .. }));
        assert!(!out.join(MANIFEST_FILE_NAME).exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn manifest_on_disk_matches_result() {
        let dir = temp_dir("split_manifest");
        let lines: Vec<String> = (0..12).map(|i| record_line(i, 10)).collect();
        let source = write_source(&dir, &lines);

        let out = dir.join("out");
        let result = MassiveFileSplitter::new(SplitOptions::new(&out, 600))
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();

        let manifest = SplitManifest::load(&result.metadata.manifest_path).unwrap();
        assert!(manifest.complete);
        assert_eq!(manifest.chunks, result.chunks);
        assert_eq!(manifest.total_objects, 12);
        assert_eq!(
            manifest.chunks.iter().map(|c| c.record_count).sum::<usize>(),
            manifest.total_objects
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[derive(Default)]
    struct Recorder {
        chunks: Mutex<Vec<usize>>,
        line_ticks: Mutex<Vec<u64>>,
    }

    impl SplitProgress for Recorder {
        fn chunk_written(&self, chunk: &ChunkInfo) {
            self.chunks.lock().unwrap().push(chunk.chunk_id);
        }
        fn lines_scanned(&self, lines: u64, _bytes_read: u64, _total_bytes: u64) {
            self.line_ticks.lock().unwrap().push(lines);
        }
    }

    #[test]
    fn progress_fires_per_chunk_and_per_line_interval() {
        let dir = temp_dir("split_progress");
        let lines: Vec<String> = (0..25).map(|i| record_line(i, 0)).collect();
        let source = write_source(&dir, &lines);
        let width = lines[0].len() as u64 + 1;

        let mut opts = SplitOptions::new(dir.join("out"), width * 10);
        opts.progress_every_lines = 10;
        let recorder = Recorder::default();
        MassiveFileSplitter::new(opts)
            .unwrap()
            .split(&source, &recorder)
            .unwrap();

        assert_eq!(*recorder.chunks.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(*recorder.line_ticks.lock().unwrap(), vec![10, 20]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// 25 MB of records at a 10 MB target gives three chunks.
    #[test]
    fn twenty_five_megabytes_make_three_chunks() {
        const MB: u64 = 1_000_000;
        let dir = temp_dir("split_25mb");
        let source = dir.join("big.jsonl");
        let mut writer = std::io::BufWriter::new(File::create(&source).unwrap());
        let mut written: u64 = 0;
        let mut valid = 0usize;
        let mut i = 0usize;
        while written < 25 * MB {
            let line = if i % 1000 == 999 {
                "{\"id\": \"corrupt\", \"graph\": ".to_string()
            } else {
                valid += 1;
                record_line(i, 200)
            };
            writeln!(writer, "{line}").unwrap();
            written += line.len() as u64 + 1;
            i += 1;
        }
        drop(writer);

        let result = MassiveFileSplitter::new(SplitOptions::new(dir.join("out"), 10 * MB))
            .unwrap()
            .split(&source, &SilentSplitProgress)
            .unwrap();

        assert_eq!(result.total_chunks, 3);
        assert_eq!(result.total_objects, valid);
        assert_eq!(
            result.chunks.iter().map(|c| c.record_count).sum::<usize>(),
            valid
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
