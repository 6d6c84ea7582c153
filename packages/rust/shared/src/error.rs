//! Error types for graphqa.
//!
//! Library crates use [`GraphQaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only job-aborting conditions are errors. A malformed input line or a record
//! missing its graph fields is not an error at all: the splitter counts it and
//! the pipeline reports it as a skipped record outcome.

use std::path::PathBuf;

/// Top-level error type for all graphqa operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphQaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The source dataset file is missing or cannot be read.
    #[error("source file {path:?} is unreadable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A chunk file could not be written.
    #[error("failed to write chunk {path:?}: {source}")]
    ChunkWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON or TOML parsing error for a document the pipeline owns.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (manifest mismatch, checksum failure, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Serialization of an output document failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Process memory stayed above the forced-cleanup threshold.
    #[error("memory budget exceeded: {usage_bytes} bytes in use, limit {limit_bytes} bytes")]
    MemoryBudgetExceeded { usage_bytes: u64, limit_bytes: u64 },

    /// No job with the given id is known to the service.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The job exists but has no result to hand out.
    #[error("job {id} has no result (status: {status})")]
    JobNotReady { id: String, status: String },

    /// Another active job is already converting this source.
    #[error("source {path:?} is already being converted by job {job}")]
    SourceBusy { path: PathBuf, job: String },

    /// The job was cancelled at a chunk boundary.
    #[error("conversion cancelled")]
    Cancelled,

    /// The background worker failed outside the pipeline (panic, join error).
    #[error("worker error: {0}")]
    Worker(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GraphQaError>;

impl GraphQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts a conversion job.
    ///
    /// Cancellation is terminal but not a failure, so it is the one
    /// non-fatal variant.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for GraphQaError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Serialization(err.to_string())
        } else {
            Self::parse(err.to_string())
        }
    }
}
