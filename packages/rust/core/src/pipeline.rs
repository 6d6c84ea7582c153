//! End-to-end conversion: source file → chunks → QA entries → dataset.
//!
//! The pipeline is synchronous and meant to run on a blocking thread.
//!
//! 1. Analyze: fingerprint the source and pick the work directory
//! 2. Resume or split: reuse a validated checkpoint, or split from scratch
//! 3. Convert: analyze every record of every remaining chunk, in batches
//! 4. Finalize: assemble the dataset from the converted chunk outputs
//!
//! Each converted chunk is written to `converted/` before the checkpoint
//! moves past it, so a resumed run assembles the same bytes a clean run does.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use graphqa_analyzer::analyze_record;
use graphqa_shared::fs::write_atomic;
use graphqa_shared::{
    AnswerType, ConversionConfig, Dataset, GraphQaError, GraphRecord, JobId, QaEntry, Result,
};
use graphqa_splitter::{
    ChunkInfo, MANIFEST_FILE_NAME, MassiveFileSplitter, SplitManifest, SplitOptions,
    SplitProgress, SplitStrategy, chunk_matches_manifest, trim_line_ending,
    validate_chunk_integrity,
};

use crate::checkpoint::{CheckpointManager, ProcessingCheckpoint, SourceFingerprint};
use crate::dataset::{
    DatasetBuilder, META_ANALYSIS, META_COMPLEXITY, META_GRAPH_TYPE, META_NAVIGATION_TYPE,
};
use crate::job::{
    ANALYZING_PROGRESS, FINALIZING_PROGRESS, JobStatus, SPLIT_START_PROGRESS, converting_progress,
};
use crate::memory::{MemoryMonitor, MemoryStats};

/// Characters of the hex source-path digest used as the work directory name.
const WORK_KEY_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Counts published after every converted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub chunks_done: usize,
    pub chunks_total: usize,
    pub records_converted: usize,
    pub records_skipped: usize,
}

/// Progress callback for the conversion pipeline.
pub trait ConversionReporter: Send + Sync {
    /// Called when the pipeline enters a new stage.
    fn stage(&self, status: JobStatus, progress: f64);
    /// Called while the source is being split.
    fn split_scanned(&self, bytes_read: u64, total_bytes: u64);
    /// Called once the chunk list is known.
    fn planned(&self, chunks_total: usize, invalid_lines: usize, resumed_from_chunk: Option<usize>);
    /// Called after each chunk's output and checkpoint are on disk.
    fn chunk_converted(&self, progress: &ChunkProgress);
}

/// No-op reporter for headless/test usage.
pub struct SilentReporter;

impl ConversionReporter for SilentReporter {
    fn stage(&self, _status: JobStatus, _progress: f64) {}
    fn split_scanned(&self, _bytes_read: u64, _total_bytes: u64) {}
    fn planned(&self, _chunks_total: usize, _invalid_lines: usize, _resumed: Option<usize>) {}
    fn chunk_converted(&self, _progress: &ChunkProgress) {}
}

/// Adapts a [`ConversionReporter`] to the splitter's callbacks.
struct SplitReporter<'a>(&'a dyn ConversionReporter);

impl SplitProgress for SplitReporter<'_> {
    fn chunk_written(&self, chunk: &ChunkInfo) {
        debug!(chunk_id = chunk.chunk_id, records = chunk.record_count, "chunk split");
    }

    fn lines_scanned(&self, _lines: u64, bytes_read: u64, total_bytes: u64) {
        self.0.split_scanned(bytes_read, total_bytes);
    }
}

/// Live counters shared with the heartbeat task.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    records_seen: AtomicU64,
    records_converted: AtomicUsize,
    records_skipped: AtomicUsize,
    chunks_done: AtomicUsize,
}

impl PipelineCounters {
    pub fn records_seen(&self) -> u64 {
        self.records_seen.load(Ordering::Relaxed)
    }

    pub fn records_converted(&self) -> usize {
        self.records_converted.load(Ordering::Relaxed)
    }

    pub fn records_skipped(&self) -> usize {
        self.records_skipped.load(Ordering::Relaxed)
    }

    pub fn chunks_done(&self) -> usize {
        self.chunks_done.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Per-record conversion
// ---------------------------------------------------------------------------

/// What happened to one input record.
#[derive(Debug)]
pub enum RecordOutcome {
    Converted(Box<QaEntry>),
    /// The line is valid JSON but not a convertible graph record.
    Skipped { line: usize, reason: String },
    /// The job cannot continue.
    Fatal(GraphQaError),
}

/// Analyze one chunk line and build its QA entry.
///
/// `line` is the 1-based line number within the chunk, used for reporting.
pub fn convert_record(bytes: &[u8], line: usize) -> RecordOutcome {
    let record: GraphRecord = match serde_json::from_slice(bytes) {
        Ok(r) => r,
        Err(e) => {
            return RecordOutcome::Skipped {
                line,
                reason: format!("not a graph record: {e}"),
            };
        }
    };

    let analysis = analyze_record(&record);
    let analysis_value = match serde_json::to_value(&analysis) {
        Ok(v) => v,
        Err(e) => return RecordOutcome::Fatal(GraphQaError::Serialization(e.to_string())),
    };

    let mut metadata: BTreeMap<String, Value> = record.metadata.into_iter().collect();
    metadata.insert(META_GRAPH_TYPE.into(), analysis.graph_type.as_str().into());
    metadata.insert(
        META_NAVIGATION_TYPE.into(),
        analysis.navigation_type.as_str().into(),
    );
    metadata.insert(META_COMPLEXITY.into(), analysis.complexity.as_str().into());
    metadata.insert(META_ANALYSIS.into(), analysis_value);

    RecordOutcome::Converted(Box::new(QaEntry {
        id: record.id,
        question: record.question,
        answer_type: AnswerType::of(&record.answer),
        correct_answer: record.answer,
        choices: record.choices,
        metadata,
    }))
}

// ---------------------------------------------------------------------------
// Work directory
// ---------------------------------------------------------------------------

/// Per-source scratch space: chunks, converted outputs, checkpoint.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// `<work_root>/<sha256(canonical path)[..16]>`.
    pub fn for_source(work_root: &Path, canonical_source: &Path) -> Self {
        let digest = format!(
            "{:x}",
            Sha256::digest(canonical_source.to_string_lossy().as_bytes())
        );
        Self {
            root: work_root.join(&digest[..WORK_KEY_LEN]),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.chunks_dir().join(MANIFEST_FILE_NAME)
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.root.join("converted")
    }

    pub fn converted_path(&self, chunk: &ChunkInfo) -> PathBuf {
        self.converted_dir()
            .join(format!("chunk_{:05}.qa.jsonl", chunk.chunk_id))
    }
}

// ---------------------------------------------------------------------------
// Chunk scratch buffers
// ---------------------------------------------------------------------------

/// Buffers of the chunk being converted, shared with the memory monitor.
///
/// A cleanup round moves the converted bytes gathered so far into a `.part`
/// file beside the chunk's output and drops spare capacity. `finish` appends
/// the rest and renames the part file into place, so the output bytes are the
/// same whether or not a spill happened.
#[derive(Debug, Default)]
struct Scratch {
    batch: Vec<(usize, Vec<u8>)>,
    out: Vec<u8>,
    part_path: Option<PathBuf>,
    part: Option<File>,
    spill_error: Option<GraphQaError>,
    spills: usize,
}

impl Scratch {
    fn begin(&mut self, part_path: PathBuf) {
        self.batch.clear();
        self.out.clear();
        self.part = None;
        self.spill_error = None;
        self.part_path = Some(part_path);
    }

    /// Cleanup hook body. Errors are held until `finish`.
    fn release(&mut self) {
        if !self.out.is_empty() && self.spill_error.is_none() {
            if let Some(path) = self.part_path.clone() {
                match self.append_part(&path) {
                    Ok(()) => {
                        self.out.clear();
                        self.spills += 1;
                    }
                    Err(e) => self.spill_error = Some(e),
                }
            }
        }
        self.out.shrink_to_fit();
        self.batch.shrink_to_fit();
    }

    fn append_part(&mut self, path: &Path) -> Result<()> {
        if self.part.is_none() {
            self.part = Some(File::create(path).map_err(|e| GraphQaError::io(path, e))?);
        }
        if let Some(file) = self.part.as_mut() {
            file.write_all(&self.out)
                .map_err(|e| GraphQaError::io(path, e))?;
        }
        Ok(())
    }

    /// Write the chunk's complete output to `path`.
    fn finish(&mut self, path: &Path) -> Result<()> {
        let part_path = self.part_path.take();
        let part = self.part.take();
        if let Some(err) = self.spill_error.take() {
            if let Some(p) = &part_path {
                let _ = std::fs::remove_file(p);
            }
            return Err(err);
        }

        let written = match (part, part_path) {
            (Some(mut file), Some(part_path)) => {
                file.write_all(&self.out)
                    .and_then(|()| file.sync_all())
                    .map_err(|e| GraphQaError::io(&part_path, e))?;
                drop(file);
                std::fs::rename(&part_path, path).map_err(|e| GraphQaError::io(path, e))
            }
            _ => write_atomic(path, &self.out),
        };
        self.out.clear();
        written
    }
}

fn part_path_for(output: &Path) -> PathBuf {
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Input for one conversion run.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub job_id: JobId,
    pub source: PathBuf,
    pub config: ConversionConfig,
    /// Parent of all per-source work directories.
    pub work_root: PathBuf,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct ConversionOutput {
    pub dataset: Dataset,
    pub chunks_total: usize,
    /// 1-based id of the first chunk converted when the run resumed.
    pub resumed_from_chunk: Option<usize>,
    pub memory: MemoryStats,
    pub work_dir: PathBuf,
    pub elapsed: Duration,
}

/// Progress carried across chunks and restored from a checkpoint.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    chunks_processed: usize,
    questions_generated: usize,
    records_skipped: usize,
}

impl From<&ProcessingCheckpoint> for Tally {
    fn from(cp: &ProcessingCheckpoint) -> Self {
        Self {
            chunks_processed: cp.chunks_processed,
            questions_generated: cp.questions_generated,
            records_skipped: cp.records_skipped,
        }
    }
}

/// Counts for one chunk.
#[derive(Debug, Default)]
struct ChunkTally {
    converted: usize,
    skipped: usize,
}

pub struct ConversionPipeline {
    request: ConversionRequest,
    memory: Arc<MemoryMonitor>,
    counters: Arc<PipelineCounters>,
    cancel: Arc<AtomicBool>,
    scratch: Arc<Mutex<Scratch>>,
}

impl ConversionPipeline {
    pub fn new(request: ConversionRequest) -> Result<Self> {
        request.config.validate()?;
        let memory = MemoryMonitor::new(request.config.max_memory_usage_bytes);
        let scratch = Arc::new(Mutex::new(Scratch::default()));
        register_scratch(&memory, &scratch);
        Ok(Self {
            request,
            memory: Arc::new(memory),
            counters: Arc::new(PipelineCounters::default()),
            cancel: Arc::new(AtomicBool::new(false)),
            scratch,
        })
    }

    /// Replace the memory monitor. The pipeline's cleanup hook is registered
    /// on it alongside any hooks it already carries.
    pub fn with_memory_monitor(mut self, monitor: MemoryMonitor) -> Self {
        register_scratch(&monitor, &self.scratch);
        self.memory = Arc::new(monitor);
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    fn scratch(&self) -> MutexGuard<'_, Scratch> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the pipeline to completion, cancellation, or the first fatal error.
    #[instrument(skip_all, fields(job = %self.request.job_id, source = %self.request.source.display()))]
    pub fn run(&self, reporter: &dyn ConversionReporter) -> Result<ConversionOutput> {
        let start = Instant::now();
        let config = &self.request.config;

        // --- Phase 1: Analyze ---
        reporter.stage(JobStatus::Analyzing, ANALYZING_PROGRESS);
        let source = std::fs::canonicalize(&self.request.source).map_err(|e| {
            GraphQaError::SourceUnreadable {
                path: self.request.source.clone(),
                source: e,
            }
        })?;
        let fingerprint = SourceFingerprint::of(&source)?;
        let work = WorkDir::for_source(&self.request.work_root, &source);
        std::fs::create_dir_all(work.root()).map_err(|e| GraphQaError::io(work.root(), e))?;
        let checkpoints = CheckpointManager::for_job_dir(work.root());

        info!(
            size = fingerprint.size_bytes,
            strategy = ?SplitStrategy::for_source(fingerprint.size_bytes, config.target_chunk_size_bytes),
            work_dir = %work.root().display(),
            "source analyzed"
        );
        reporter.stage(JobStatus::Analyzing, SPLIT_START_PROGRESS);

        // --- Phase 2: Resume or split ---
        let resumed = if config.enable_checkpointing {
            resume_point(&work, &checkpoints, &fingerprint)
        } else {
            None
        };
        let resumed_from_chunk = resumed.as_ref().map(|(_, t)| t.chunks_processed + 1);
        let (manifest, mut tally) = match resumed {
            Some(found) => found,
            None => {
                checkpoints.clear()?;
                (self.split_fresh(&work, &source, reporter)?, Tally::default())
            }
        };

        let chunks_total = manifest.chunks.len();
        reporter.planned(chunks_total, manifest.invalid_records, resumed_from_chunk);
        reporter.stage(
            JobStatus::Converting,
            converting_progress(tally.chunks_processed, chunks_total),
        );
        self.counters
            .chunks_done
            .store(tally.chunks_processed, Ordering::Relaxed);
        self.counters
            .records_converted
            .store(tally.questions_generated, Ordering::Relaxed);
        self.counters
            .records_skipped
            .store(tally.records_skipped, Ordering::Relaxed);

        // --- Phase 3: Convert ---
        let converted_dir = work.converted_dir();
        std::fs::create_dir_all(&converted_dir)
            .map_err(|e| GraphQaError::io(&converted_dir, e))?;

        for chunk in &manifest.chunks[tally.chunks_processed..] {
            if self.cancel.load(Ordering::SeqCst) {
                info!(next_chunk = chunk.chunk_id, "cancelled at chunk boundary");
                return Err(GraphQaError::Cancelled);
            }

            let done = self.convert_chunk(&work, chunk)?;
            tally.chunks_processed += 1;
            tally.questions_generated += done.converted;
            tally.records_skipped += done.skipped;
            self.counters.chunks_done.fetch_add(1, Ordering::Relaxed);

            if config.enable_checkpointing {
                checkpoints.save(&ProcessingCheckpoint {
                    job_id: self.request.job_id,
                    source: fingerprint.clone(),
                    chunks_processed: tally.chunks_processed,
                    questions_generated: tally.questions_generated,
                    records_skipped: tally.records_skipped,
                    current_chunk: manifest.chunks.get(tally.chunks_processed).map(|c| c.chunk_id),
                    saved_at: Utc::now(),
                    memory_usage_bytes: self.memory.current_usage(),
                })?;
            }

            reporter.chunk_converted(&ChunkProgress {
                chunks_done: tally.chunks_processed,
                chunks_total,
                records_converted: tally.questions_generated,
                records_skipped: tally.records_skipped,
            });
        }

        // --- Phase 4: Finalize ---
        reporter.stage(JobStatus::Finalizing, FINALIZING_PROGRESS);
        let mut builder = DatasetBuilder::new();
        for chunk in &manifest.chunks {
            builder.extend(read_entries(&work.converted_path(chunk))?);
        }
        if builder.len() != tally.questions_generated {
            return Err(GraphQaError::validation(format!(
                "assembled {} entries, expected {}",
                builder.len(),
                tally.questions_generated
            )));
        }
        builder.add_skipped(tally.records_skipped);
        builder.set_invalid_lines(manifest.invalid_records);
        let dataset = builder.finish(config, fingerprint.path.clone());

        checkpoints.clear()?;
        if !config.keep_chunks {
            if let Err(e) = std::fs::remove_dir_all(work.root()) {
                warn!(path = %work.root().display(), error = %e, "failed to remove work directory");
            }
        }

        let elapsed = start.elapsed();
        info!(
            entries = dataset.statistics.total_entries,
            skipped = dataset.statistics.skipped_records,
            invalid = dataset.statistics.invalid_lines,
            chunks = chunks_total,
            elapsed_ms = elapsed.as_millis(),
            "conversion complete"
        );

        Ok(ConversionOutput {
            dataset,
            chunks_total,
            resumed_from_chunk,
            memory: self.memory.stats(),
            work_dir: work.root().to_path_buf(),
            elapsed,
        })
    }

    fn split_fresh(
        &self,
        work: &WorkDir,
        source: &Path,
        reporter: &dyn ConversionReporter,
    ) -> Result<SplitManifest> {
        let config = &self.request.config;
        for dir in [work.chunks_dir(), work.converted_dir()] {
            remove_dir_if_present(&dir)?;
        }

        let mut options = SplitOptions::new(work.chunks_dir(), config.target_chunk_size_bytes);
        options.preserve_integrity = config.preserve_graph_integrity;
        options.enable_checkpointing = config.enable_checkpointing;

        let splitter = MassiveFileSplitter::new(options)?;
        let result = self
            .memory
            .with_monitoring(|| splitter.split(source, &SplitReporter(reporter)))?;
        SplitManifest::load(&result.metadata.manifest_path)
    }

    /// Convert one chunk file and write its entries to `converted/`.
    ///
    /// The scratch lock is never held across `with_monitoring`, whose
    /// cleanup hook takes it.
    fn convert_chunk(&self, work: &WorkDir, chunk: &ChunkInfo) -> Result<ChunkTally> {
        let batch_size = self.request.config.batch_size;
        let path = SplitManifest::chunk_path(&work.chunks_dir(), chunk);
        let file = File::open(&path).map_err(|e| GraphQaError::io(&path, e))?;
        let mut reader = BufReader::new(file);
        let output = work.converted_path(chunk);
        self.scratch().begin(part_path_for(&output));

        let mut tally = ChunkTally::default();
        let mut line_no = 0;

        loop {
            let mut line = Vec::new();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| GraphQaError::io(&path, e))?;
            if n == 0 {
                break;
            }
            line_no += 1;
            let full = {
                let mut scratch = self.scratch();
                scratch.batch.push((line_no, line));
                scratch.batch.len() >= batch_size
            };
            if full {
                self.memory
                    .with_monitoring(|| self.convert_batch(chunk, &mut tally))?;
            }
        }
        let pending = !self.scratch().batch.is_empty();
        if pending {
            self.memory
                .with_monitoring(|| self.convert_batch(chunk, &mut tally))?;
        }

        self.scratch().finish(&output)?;
        debug!(
            chunk_id = chunk.chunk_id,
            converted = tally.converted,
            skipped = tally.skipped,
            "chunk converted"
        );
        Ok(tally)
    }

    fn convert_batch(&self, chunk: &ChunkInfo, tally: &mut ChunkTally) -> Result<()> {
        let mut scratch = self.scratch();
        let Scratch { batch, out, .. } = &mut *scratch;
        for (line_no, line) in batch.drain(..) {
            let bytes = trim_line_ending(&line);
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.counters.records_seen.fetch_add(1, Ordering::Relaxed);

            match convert_record(bytes, line_no) {
                RecordOutcome::Converted(entry) => {
                    serde_json::to_writer(&mut *out, &entry)?;
                    out.push(b'\n');
                    tally.converted += 1;
                    self.counters.records_converted.fetch_add(1, Ordering::Relaxed);
                }
                RecordOutcome::Skipped { line, reason } => {
                    debug!(chunk_id = chunk.chunk_id, line, %reason, "record skipped");
                    tally.skipped += 1;
                    self.counters.records_skipped.fetch_add(1, Ordering::Relaxed);
                }
                RecordOutcome::Fatal(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn register_scratch(monitor: &MemoryMonitor, scratch: &Arc<Mutex<Scratch>>) {
    let scratch = Arc::clone(scratch);
    monitor.register_cleanup(move || {
        scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release();
    });
}

/// Run a pipeline with a fresh memory monitor and no external cancellation.
pub fn run_conversion(
    request: ConversionRequest,
    reporter: &dyn ConversionReporter,
) -> Result<ConversionOutput> {
    ConversionPipeline::new(request)?.run(reporter)
}

/// Load the checkpoint for `source` and check that everything it vouches
/// for is still on disk and intact.
fn resume_point(
    work: &WorkDir,
    checkpoints: &CheckpointManager,
    source: &SourceFingerprint,
) -> Option<(SplitManifest, Tally)> {
    let checkpoint = checkpoints.load_for(source)?;
    match validate_resume(work, &checkpoint) {
        Ok(manifest) => {
            info!(
                chunks_processed = checkpoint.chunks_processed,
                questions = checkpoint.questions_generated,
                "resuming from checkpoint"
            );
            Some((manifest, Tally::from(&checkpoint)))
        }
        Err(reason) => {
            warn!(%reason, "checkpoint failed validation, restarting from chunk 0");
            None
        }
    }
}

fn validate_resume(
    work: &WorkDir,
    checkpoint: &ProcessingCheckpoint,
) -> std::result::Result<SplitManifest, String> {
    let manifest = SplitManifest::load(&work.manifest_path()).map_err(|e| e.to_string())?;
    if !manifest.complete {
        return Err("split manifest is incomplete".into());
    }
    if checkpoint.chunks_processed > manifest.chunks.len() {
        return Err(format!(
            "checkpoint covers {} chunks, manifest lists {}",
            checkpoint.chunks_processed,
            manifest.chunks.len()
        ));
    }

    let chunks_dir = work.chunks_dir();
    let mut entries = 0;
    for chunk in &manifest.chunks[..checkpoint.chunks_processed] {
        if !chunk_matches_manifest(&chunks_dir, chunk).map_err(|e| e.to_string())? {
            return Err(format!("{} does not match the manifest", chunk.filename));
        }
        let report = validate_chunk_integrity(&SplitManifest::chunk_path(&chunks_dir, chunk))
            .map_err(|e| e.to_string())?;
        if !report.malformed_lines.is_empty() || report.total_lines != chunk.record_count {
            return Err(format!("{} failed integrity validation", chunk.filename));
        }
        entries += read_entries(&work.converted_path(chunk))
            .map_err(|e| e.to_string())?
            .len();
    }

    if entries != checkpoint.questions_generated {
        return Err(format!(
            "converted outputs hold {entries} entries, checkpoint expects {}",
            checkpoint.questions_generated
        ));
    }
    Ok(manifest)
}

fn read_entries(path: &Path) -> Result<Vec<QaEntry>> {
    let file = File::open(path).map_err(|e| GraphQaError::io(path, e))?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| GraphQaError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| {
            GraphQaError::parse(format!("invalid converted entry in {}: {e}", path.display()))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GraphQaError::io(dir, e)),
    }
}
