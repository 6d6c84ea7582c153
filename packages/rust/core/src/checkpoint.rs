//! Durable conversion progress for resume after interruption.
//!
//! One `checkpoint.json` per work directory, overwritten at every chunk
//! boundary and removed once the job succeeds. A checkpoint that is missing,
//! unreadable, or unparsable is treated as "no checkpoint".

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use graphqa_shared::fs::write_json_atomic;
use graphqa_shared::{GraphQaError, JobId, Result};

/// File name of the checkpoint inside a work directory.
pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";

/// Identity of the source file a checkpoint belongs to. A checkpoint whose
/// fingerprint no longer matches the file on disk is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub path: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_unix_ms: Option<i64>,
}

impl SourceFingerprint {
    pub fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|e| GraphQaError::SourceUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let modified_unix_ms = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis());

        Ok(Self {
            path: path.display().to_string(),
            size_bytes: meta.len(),
            modified_unix_ms,
        })
    }
}

/// Pipeline progress as of the last chunk boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingCheckpoint {
    /// Job that wrote the checkpoint.
    pub job_id: JobId,
    pub source: SourceFingerprint,
    /// Chunks fully converted, in manifest order.
    pub chunks_processed: usize,
    /// Cumulative QA entries produced.
    pub questions_generated: usize,
    /// Cumulative records skipped during conversion.
    pub records_skipped: usize,
    /// Chunk being worked on when the checkpoint was written, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<usize>,
    pub saved_at: DateTime<Utc>,
    pub memory_usage_bytes: u64,
}

/// Reads and writes the checkpoint of one work directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn for_job_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(CHECKPOINT_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the checkpoint atomically.
    pub fn save(&self, checkpoint: &ProcessingCheckpoint) -> Result<()> {
        write_json_atomic(&self.path, checkpoint)?;
        debug!(
            chunks_processed = checkpoint.chunks_processed,
            questions = checkpoint.questions_generated,
            "checkpoint saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Option<ProcessingCheckpoint> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint unreadable, ignoring");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(cp) => Some(cp),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint corrupt, ignoring");
                None
            }
        }
    }

    /// Load the checkpoint only if it was written for `source` as it is now.
    pub fn load_for(&self, source: &SourceFingerprint) -> Option<ProcessingCheckpoint> {
        let checkpoint = self.load()?;
        if &checkpoint.source == source {
            Some(checkpoint)
        } else {
            warn!(path = %self.path.display(), "checkpoint belongs to a different source version, ignoring");
            None
        }
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GraphQaError::io(&self.path, e)),
        }
    }
}
