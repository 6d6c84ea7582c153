//! Record-safe splitting of oversized line-delimited JSON files.
//!
//! This crate provides:
//! - [`MassiveFileSplitter`]: streams a source file into size-bounded chunk
//!   files without ever splitting a record
//! - [`SplitManifest`]: the durable index of one split
//! - [`integrity`]: chunk re-validation, split verification, and re-merge

pub mod integrity;
pub mod manifest;
pub mod splitter;

pub use integrity::{
    ChunkIntegrityReport, MergeSummary, ShapeViolation, VerifyReport, chunk_matches_manifest,
    merge_chunks, validate_chunk_integrity, verify_split,
};
pub use manifest::{
    ChunkInfo, MANIFEST_FILE_NAME, MANIFEST_SCHEMA_VERSION, SplitManifest, SplitStrategy,
};
pub use splitter::{
    MassiveFileSplitter, SilentSplitProgress, SplitMetadata, SplitOptions, SplitProgress,
    SplitResult, trim_line_ending,
};
