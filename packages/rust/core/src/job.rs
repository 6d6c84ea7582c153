//! Job state and its single-writer publication channel.
//!
//! Each job's state lives in a `tokio::sync::watch` channel. The worker side
//! holds the [`JobPublisher`]; every update builds a new [`JobSnapshot`] and
//! swaps it in whole, so pollers never see a half-written state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use graphqa_shared::{ConversionConfig, GraphQaError, JobId};

use crate::pipeline::{ChunkProgress, ConversionReporter};

/// Progress never reaches this value while work is still running.
pub const ACTIVE_PROGRESS_CAP: f64 = 0.79;
pub const ANALYZING_PROGRESS: f64 = 0.02;
pub const SPLIT_START_PROGRESS: f64 = 0.05;
pub const CONVERT_START_PROGRESS: f64 = 0.20;
pub const FINALIZING_PROGRESS: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Analyzing,
    Converting,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Analyzing => "analyzing",
            Self::Converting => "converting",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// States in which progress is held under [`ACTIVE_PROGRESS_CAP`].
    fn is_capped(&self) -> bool {
        matches!(self, Self::Queued | Self::Analyzing | Self::Converting)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one job, as returned by `status()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    /// Fraction in `0.0..=1.0`, never decreasing.
    pub progress: f64,
    pub source_path: PathBuf,
    /// Configuration the job was submitted with.
    pub config: ConversionConfig,
    pub chunks_total: usize,
    pub chunks_done: usize,
    pub records_converted: usize,
    pub records_skipped: usize,
    /// Lines dropped by the splitter as malformed JSON.
    pub invalid_lines: usize,
    /// Live count of records read by the worker, refreshed by the heartbeat.
    pub records_seen: u64,
    /// First chunk processed when the job resumed from a checkpoint.
    pub resumed_from_chunk: Option<usize>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn queued(id: JobId, source_path: PathBuf, config: ConversionConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0.0,
            source_path,
            config,
            chunks_total: 0,
            chunks_done: 0,
            records_converted: 0,
            records_skipped: 0,
            invalid_lines: 0,
            records_seen: 0,
            resumed_from_chunk: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}

/// Fraction of the converting band reached after `done` of `total` chunks.
pub fn converting_progress(done: usize, total: usize) -> f64 {
    if total == 0 {
        return CONVERT_START_PROGRESS;
    }
    let span = ACTIVE_PROGRESS_CAP - CONVERT_START_PROGRESS;
    CONVERT_START_PROGRESS + span * (done as f64 / total as f64)
}

fn next_progress(status: JobStatus, previous: f64, proposed: f64) -> f64 {
    let mut progress = proposed.clamp(0.0, 1.0);
    if status.is_capped() {
        progress = progress.min(ACTIVE_PROGRESS_CAP);
    }
    progress.max(previous)
}

/// Write side of a job's state channel.
///
/// Updates after the job reached a terminal state are dropped.
#[derive(Debug)]
pub struct JobPublisher {
    tx: watch::Sender<JobSnapshot>,
}

impl JobPublisher {
    pub fn new(initial: JobSnapshot) -> (Self, watch::Receiver<JobSnapshot>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.tx.borrow().clone()
    }

    /// Build the next snapshot from the current one and publish it.
    ///
    /// Returns `false`, without waking subscribers, when the update changes
    /// nothing or the job is already terminal.
    /// Returns `false` if the job was already terminal.
    pub fn publish(&self, update: impl FnOnce(&mut JobSnapshot)) -> bool {
        self.tx.send_if_modified(|current| {
            if current.status.is_terminal() {
                return false;
            }
            let mut next = current.clone();
            update(&mut next);

            next.progress = next_progress(next.status, current.progress, next.progress);
            if next == *current {
                return false;
            }
            next.updated_at = Utc::now();
            if next.status.is_terminal() && next.finished_at.is_none() {
                next.finished_at = Some(next.updated_at);
            }
            *current = next;
            true
        })
    }

    pub fn set_status(&self, status: JobStatus, progress: f64) -> bool {
        self.publish(|s| {
            s.status = status;
            s.progress = progress;
        })
    }

    pub fn complete(&self) -> bool {
        self.set_status(JobStatus::Completed, 1.0)
    }

    pub fn cancelled(&self) -> bool {
        self.publish(|s| s.status = JobStatus::Cancelled)
    }

    pub fn fail(&self, err: &GraphQaError) -> bool {
        self.publish(|s| {
            s.status = JobStatus::Failed;
            s.error = Some(err.to_string());
        })
    }
}

impl ConversionReporter for JobPublisher {
    fn stage(&self, status: JobStatus, progress: f64) {
        self.set_status(status, progress);
    }

    fn split_scanned(&self, bytes_read: u64, total_bytes: u64) {
        let fraction = if total_bytes == 0 {
            1.0
        } else {
            (bytes_read as f64 / total_bytes as f64).min(1.0)
        };
        let progress =
            SPLIT_START_PROGRESS + (CONVERT_START_PROGRESS - SPLIT_START_PROGRESS) * fraction;
        self.publish(|s| s.progress = progress);
    }

    fn planned(&self, chunks_total: usize, invalid_lines: usize, resumed_from_chunk: Option<usize>) {
        self.publish(|s| {
            s.chunks_total = chunks_total;
            s.invalid_lines = invalid_lines;
            s.resumed_from_chunk = resumed_from_chunk;
        });
    }

    fn chunk_converted(&self, progress: &ChunkProgress) {
        self.publish(|s| {
            s.chunks_done = progress.chunks_done;
            s.chunks_total = progress.chunks_total;
            s.records_converted = progress.records_converted;
            s.records_skipped = progress.records_skipped;
            s.progress = converting_progress(progress.chunks_done, progress.chunks_total);
        });
    }
}
