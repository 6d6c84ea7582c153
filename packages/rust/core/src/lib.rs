//! Conversion orchestration for graphqa.
//!
//! This crate ties the splitter and the analyzer together into the
//! graph-dataset → QA-corpus pipeline and wraps it in an asynchronous job
//! service:
//! - [`memory`]: process memory ceiling with tiered cleanup
//! - [`checkpoint`]: durable progress for resume after interruption
//! - [`pipeline`]: split, convert, and assemble one source file
//! - [`service`]: job registry with status, cancellation and retention

pub mod checkpoint;
pub mod dataset;
pub mod job;
pub mod memory;
pub mod pipeline;
pub mod service;

pub use checkpoint::{
    CHECKPOINT_FILE_NAME, CheckpointManager, ProcessingCheckpoint, SourceFingerprint,
};
pub use dataset::DatasetBuilder;
pub use job::{JobPublisher, JobSnapshot, JobStatus};
pub use memory::{MemoryMonitor, MemoryProbe, MemoryStats, ProcessMemoryProbe};
pub use pipeline::{
    ChunkProgress, ConversionOutput, ConversionPipeline, ConversionReporter, ConversionRequest,
    PipelineCounters, RecordOutcome, SilentReporter, WorkDir, convert_record, run_conversion,
};
pub use service::{GraphConversionService, ProcessingStatistics, ServiceConfig};
