//! Asynchronous job interface over the conversion pipeline.
//!
//! The service is constructed explicitly inside a Tokio runtime and owns a
//! registry of jobs. Each job runs the blocking pipeline on
//! `spawn_blocking`, with a heartbeat ticker next to it publishing live
//! counters. Callers poll [`GraphConversionService::status`]; nothing here
//! blocks on job completion except [`GraphConversionService::shutdown`].
//!
//! Work directories are keyed by source path, so at most one active job
//! per canonical source is admitted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use graphqa_shared::{AppConfig, ConversionConfig, Dataset, GraphQaError, JobId, Result};

use crate::job::{JobPublisher, JobSnapshot, JobStatus};
use crate::pipeline::{ConversionPipeline, ConversionRequest};

const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

/// Service-level settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Parent of all per-source work directories.
    pub work_dir: PathBuf,
    /// How long terminal jobs stay queryable.
    pub job_retention: Duration,
    /// Interval of the per-job heartbeat.
    pub heartbeat_interval: Duration,
}

impl ServiceConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            work_dir: config.service.resolve_work_dir()?,
            job_retention: Duration::from_secs(config.service.job_retention_secs),
            heartbeat_interval: Duration::from_millis(config.service.heartbeat_interval_ms)
                .max(MIN_HEARTBEAT),
        })
    }
}

/// Aggregate counts over the jobs currently held by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStatistics {
    pub total_jobs: usize,
    pub active_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    /// Completed share of terminal jobs; 0 when none has finished.
    pub success_rate: f64,
    pub records_converted: usize,
}

type ResultSlot = Arc<Mutex<Option<Dataset>>>;

struct JobEntry {
    /// Canonical source path, or the submitted one if it cannot be resolved.
    source_key: PathBuf,
    state: watch::Receiver<JobSnapshot>,
    cancel: Arc<AtomicBool>,
    result: ResultSlot,
    task: Option<JoinHandle<()>>,
}

pub struct GraphConversionService {
    config: ServiceConfig,
    runtime: Handle,
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    closed: AtomicBool,
}

impl GraphConversionService {
    /// Create a service bound to the current Tokio runtime.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| GraphQaError::Worker(format!("no Tokio runtime available: {e}")))?;
        info!(work_dir = %config.work_dir.display(), "conversion service started");
        Ok(Self {
            config,
            runtime,
            jobs: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Submit a conversion and return immediately with its id.
    ///
    /// Fails with [`GraphQaError::SourceBusy`] while another job on the same
    /// source has not reached a terminal state.
    pub fn convert(&self, source: impl Into<PathBuf>, config: ConversionConfig) -> Result<JobId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GraphQaError::Worker("service is shut down".into()));
        }
        config.validate()?;
        self.purge_expired();

        let source = source.into();
        let source_key = std::fs::canonicalize(&source).unwrap_or_else(|_| source.clone());

        let mut jobs = self.write_jobs();
        let busy = jobs.iter().find(|(_, entry)| {
            entry.source_key == source_key && !entry.state.borrow().status.is_terminal()
        });
        if let Some((busy, _)) = busy {
            warn!(job = %busy, source = %source_key.display(), "source already in use");
            return Err(GraphQaError::SourceBusy {
                path: source_key,
                job: busy.to_string(),
            });
        }

        let id = JobId::new();
        let (publisher, state) =
            JobPublisher::new(JobSnapshot::queued(id, source.clone(), config.clone()));
        let cancel = Arc::new(AtomicBool::new(false));
        let result: ResultSlot = Arc::new(Mutex::new(None));

        let request = ConversionRequest {
            job_id: id,
            source,
            config,
            work_root: self.config.work_dir.clone(),
        };
        let task = self.runtime.spawn(run_job(
            request,
            Arc::new(publisher),
            Arc::clone(&cancel),
            Arc::clone(&result),
            self.config.heartbeat_interval,
        ));

        jobs.insert(
            id,
            JobEntry {
                source_key,
                state,
                cancel,
                result,
                task: Some(task),
            },
        );
        info!(job = %id, "job submitted");
        Ok(id)
    }

    pub fn status(&self, id: JobId) -> Result<JobSnapshot> {
        self.read_jobs()
            .get(&id)
            .map(|entry| entry.state.borrow().clone())
            .ok_or_else(|| GraphQaError::JobNotFound(id.to_string()))
    }

    /// A receiver that observes every state the job publishes from now on.
    pub fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobSnapshot>> {
        self.read_jobs()
            .get(&id)
            .map(|entry| entry.state.clone())
            .ok_or_else(|| GraphQaError::JobNotFound(id.to_string()))
    }

    /// Take the dataset of a completed job. The dataset is handed out once.
    pub fn result(&self, id: JobId) -> Result<Dataset> {
        let jobs = self.read_jobs();
        let entry = jobs
            .get(&id)
            .ok_or_else(|| GraphQaError::JobNotFound(id.to_string()))?;

        let status = entry.state.borrow().status;
        if status != JobStatus::Completed {
            return Err(GraphQaError::JobNotReady {
                id: id.to_string(),
                status: status.to_string(),
            });
        }

        entry
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| GraphQaError::JobNotReady {
                id: id.to_string(),
                status: format!("{status}, result already taken"),
            })
    }

    /// Request cooperative cancellation. Returns `false` for unknown or
    /// already-terminal jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        let jobs = self.read_jobs();
        let Some(entry) = jobs.get(&id) else {
            return false;
        };
        if entry.state.borrow().status.is_terminal() {
            return false;
        }
        entry.cancel.store(true, Ordering::SeqCst);
        info!(job = %id, "cancellation requested");
        true
    }

    pub fn list_active_jobs(&self) -> Vec<JobSnapshot> {
        let mut active: Vec<JobSnapshot> = self
            .read_jobs()
            .values()
            .map(|entry| entry.state.borrow().clone())
            .filter(|snap| !snap.status.is_terminal())
            .collect();
        active.sort_by_key(|snap| snap.id);
        active
    }

    pub fn statistics(&self) -> ProcessingStatistics {
        let mut stats = ProcessingStatistics::default();
        for entry in self.read_jobs().values() {
            let snap = entry.state.borrow();
            stats.total_jobs += 1;
            stats.records_converted += snap.records_converted;
            match snap.status {
                JobStatus::Completed => stats.completed_jobs += 1,
                JobStatus::Failed => stats.failed_jobs += 1,
                JobStatus::Cancelled => stats.cancelled_jobs += 1,
                _ => stats.active_jobs += 1,
            }
        }
        let finished = stats.completed_jobs + stats.failed_jobs + stats.cancelled_jobs;
        if finished > 0 {
            stats.success_rate = stats.completed_jobs as f64 / finished as f64;
        }
        stats
    }

    /// Drop terminal jobs older than the retention window. Active jobs are
    /// never purged. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_finished_before(Utc::now())
    }

    fn purge_finished_before(&self, now: DateTime<Utc>) -> usize {
        let retention = self.config.job_retention;
        let mut jobs = self.write_jobs();
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let snap = entry.state.borrow();
            let expired = snap.status.is_terminal()
                && snap.finished_at.is_some_and(|finished| {
                    now.signed_duration_since(finished)
                        .to_std()
                        .is_ok_and(|age| age >= retention)
                });
            !expired
        });
        let purged = before - jobs.len();
        if purged > 0 {
            debug!(purged, "expired jobs purged");
        }
        purged
    }

    /// Stop accepting jobs, cancel the running ones, and wait for every
    /// worker to exit. Job state stays queryable afterwards.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let tasks: Vec<(JobId, JoinHandle<()>)> = {
            let mut jobs = self.write_jobs();
            jobs.iter_mut()
                .filter_map(|(id, entry)| {
                    if !entry.state.borrow().status.is_terminal() {
                        entry.cancel.store(true, Ordering::SeqCst);
                    }
                    entry.task.take().map(|task| (*id, task))
                })
                .collect()
        };

        info!(jobs = tasks.len(), "draining conversion service");
        for (id, task) in tasks {
            if let Err(e) = task.await {
                warn!(job = %id, error = %e, "job task ended abnormally");
            }
        }
        info!("conversion service stopped");
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drive one job: blocking pipeline plus heartbeat, then the terminal state.
async fn run_job(
    request: ConversionRequest,
    publisher: Arc<JobPublisher>,
    cancel: Arc<AtomicBool>,
    result: ResultSlot,
    heartbeat: Duration,
) {
    let job_id = request.job_id;
    let pipeline = match ConversionPipeline::new(request) {
        Ok(p) => p.with_cancel_flag(cancel),
        Err(e) => {
            error!(job = %job_id, error = %e, "job rejected");
            publisher.fail(&e);
            return;
        }
    };
    let counters = pipeline.counters();

    let reporter = Arc::clone(&publisher);
    let mut worker = tokio::task::spawn_blocking(move || pipeline.run(reporter.as_ref()));

    let mut ticker = tokio::time::interval(heartbeat.max(MIN_HEARTBEAT));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    let joined = loop {
        tokio::select! {
            joined = &mut worker => break joined,
            _ = ticker.tick() => {
                let seen = counters.records_seen();
                if publisher.publish(|s| s.records_seen = seen) {
                    debug!(
                        job = %job_id,
                        records_seen = seen,
                        chunks_done = counters.chunks_done(),
                        "heartbeat"
                    );
                }
            }
        }
    };

    let seen = counters.records_seen();
    match joined {
        Ok(Ok(output)) => {
            let entries = output.dataset.statistics.total_entries;
            *result.lock().unwrap_or_else(PoisonError::into_inner) = Some(output.dataset);
            publisher.publish(|s| {
                s.records_seen = seen;
                s.status = JobStatus::Completed;
                s.progress = 1.0;
            });
            info!(
                job = %job_id,
                entries,
                chunks = output.chunks_total,
                peak_memory = output.memory.peak_bytes,
                elapsed_ms = output.elapsed.as_millis(),
                "job completed"
            );
        }
        Ok(Err(GraphQaError::Cancelled)) => {
            publisher.publish(|s| s.records_seen = seen);
            publisher.cancelled();
            info!(job = %job_id, "job cancelled");
        }
        Ok(Err(e)) => {
            error!(job = %job_id, error = %e, "job failed");
            publisher.publish(|s| s.records_seen = seen);
            publisher.fail(&e);
        }
        Err(e) => {
            let err = GraphQaError::Worker(format!("conversion worker panicked: {e}"));
            error!(job = %job_id, error = %err, "job failed");
            publisher.fail(&err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const FIXTURE: &str = "../../../fixtures/jsonl/graphs.jsonl";

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("graphqa_{tag}_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn service(work_dir: &Path, retention: Duration) -> GraphConversionService {
        GraphConversionService::new(ServiceConfig {
            work_dir: work_dir.to_path_buf(),
            job_retention: retention,
            heartbeat_interval: Duration::from_millis(5),
        })
        .unwrap()
    }

    async fn wait_terminal(service: &GraphConversionService, id: JobId) -> JobSnapshot {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let snap = service.status(id).unwrap();
                if snap.status.is_terminal() {
                    return snap;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    fn many_chunk_source(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let content: String = (0..50)
            .map(|i| {
                format!(
                    "{{\"id\": {i}, \"graph\": {{\"nodes\": [{{\"id\": \"a\"}}, {{\"id\": \"b\"}}], \"edges\": [{{\"from\": \"a\", \"to\": \"b\"}}]}}, \"question\": \"q{i}\", \"answer\": [\"a\", \"b\"]}}\n"
                )
            })
            .collect();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn small_chunks() -> ConversionConfig {
        ConversionConfig {
            target_chunk_size_bytes: 300,
            ..ConversionConfig::default()
        }
    }

    #[tokio::test]
    async fn fixture_job_completes_and_result_moves_out() {
        let work = temp_dir("service_fixture");
        let service = service(&work, Duration::from_secs(3600));

        let id = service.convert(FIXTURE, ConversionConfig::default()).unwrap();
        let snap = wait_terminal(&service, id).await;

        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.progress, 1.0);
        assert_eq!(snap.records_converted, 6);
        assert_eq!(snap.records_skipped, 1);
        assert_eq!(snap.invalid_lines, 1);
        assert_eq!(snap.records_seen, 7);
        assert!(snap.error.is_none());

        let dataset = service.result(id).unwrap();
        assert_eq!(dataset.entries.len(), 6);
        assert!(matches!(
            service.result(id),
            Err(GraphQaError::JobNotReady { .. })
        ));

        let stats = service.statistics();
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.success_rate, 1.0);
        assert_eq!(stats.records_converted, 6);

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn published_progress_never_decreases() {
        let work = temp_dir("service_progress");
        let source = many_chunk_source(&work, "many.jsonl");
        let service = service(&work, Duration::from_secs(3600));

        let id = service.convert(&source, small_chunks()).unwrap();
        let mut rx = service.subscribe(id).unwrap();

        let mut seen = Vec::new();
        loop {
            let snap = rx.borrow_and_update().clone();
            seen.push(snap.progress);
            if snap.status.is_terminal() {
                assert_eq!(snap.status, JobStatus::Completed);
                break;
            }
            if snap.status == JobStatus::Converting {
                assert!(snap.progress < 0.8);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&1.0));

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn missing_source_fails_the_job() {
        let work = temp_dir("service_missing");
        let service = service(&work, Duration::from_secs(3600));

        let id = service
            .convert("/no/such/graphs.jsonl", ConversionConfig::default())
            .unwrap();
        let snap = wait_terminal(&service, id).await;

        assert_eq!(snap.status, JobStatus::Failed);
        assert!(snap.error.unwrap().contains("unreadable"));
        assert!(matches!(
            service.result(id),
            Err(GraphQaError::JobNotReady { .. })
        ));
        assert_eq!(service.statistics().failed_jobs, 1);

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn cancel_before_first_chunk() {
        let work = temp_dir("service_cancel");
        let source = many_chunk_source(&work, "many.jsonl");
        let service = service(&work, Duration::from_secs(3600));

        let id = service.convert(&source, small_chunks()).unwrap();
        assert_eq!(service.list_active_jobs().len(), 1);
        assert!(service.cancel(id));

        let snap = wait_terminal(&service, id).await;
        assert_eq!(snap.status, JobStatus::Cancelled);
        assert!(!service.cancel(id));
        assert!(service.list_active_jobs().is_empty());

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn same_source_is_refused_while_a_job_is_active() {
        let work = temp_dir("service_same_source");
        let source = many_chunk_source(&work, "many.jsonl");
        let service = service(&work.join("jobs"), Duration::from_secs(3600));

        let first = service.convert(&source, small_chunks()).unwrap();
        // Same file through another spelling of its path.
        let alias = work.join(".").join("many.jsonl");
        let err = service.convert(&alias, small_chunks()).unwrap_err();
        assert!(
            matches!(&err, GraphQaError::SourceBusy { job, .. } if *job == first.to_string()),
            "{err}"
        );
        assert_eq!(service.statistics().total_jobs, 1);

        let done = wait_terminal(&service, first).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.records_converted, 50);

        // Admitted again once the first job is terminal.
        let second = service.convert(&alias, small_chunks()).unwrap();
        let again = wait_terminal(&service, second).await;
        assert_eq!(again.status, JobStatus::Completed);
        assert_eq!(again.records_converted, 50);
        assert_eq!(
            service.result(first).unwrap().entries,
            service.result(second).unwrap().entries
        );

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn different_sources_run_side_by_side() {
        let work = temp_dir("service_two_sources");
        let a = many_chunk_source(&work, "a.jsonl");
        let b = many_chunk_source(&work, "b.jsonl");
        let jobs_root = work.join("jobs");
        let service = service(&jobs_root, Duration::from_secs(3600));

        let ja = service.convert(&a, small_chunks()).unwrap();
        let jb = service.convert(&b, small_chunks()).unwrap();
        assert_eq!(service.list_active_jobs().len(), 2);

        let (sa, sb) = tokio::join!(wait_terminal(&service, ja), wait_terminal(&service, jb));
        for snap in [&sa, &sb] {
            assert_eq!(snap.status, JobStatus::Completed, "{:?}", snap.error);
            assert_eq!(snap.records_converted, 50);
            assert_eq!(snap.records_seen, 50);
        }
        assert_eq!(service.statistics().completed_jobs, 2);

        // Each job removed only its own work directory.
        let leftovers = std::fs::read_dir(&jobs_root).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn unknown_job() {
        let work = temp_dir("service_unknown");
        let service = service(&work, Duration::from_secs(3600));
        let id = JobId::new();

        assert!(matches!(service.status(id), Err(GraphQaError::JobNotFound(_))));
        assert!(matches!(service.result(id), Err(GraphQaError::JobNotFound(_))));
        assert!(!service.cancel(id));

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_terminal_jobs() {
        let work = temp_dir("service_purge");
        let service = service(&work, Duration::ZERO);

        let done = service.convert(FIXTURE, ConversionConfig::default()).unwrap();
        wait_terminal(&service, done).await;

        let pending = service.convert(FIXTURE, ConversionConfig::default()).unwrap();
        // Submitting purged the finished job; the new one has not run yet.
        assert!(matches!(service.status(done), Err(GraphQaError::JobNotFound(_))));
        assert_eq!(service.purge_expired(), 0);
        assert!(service.status(pending).is_ok());

        wait_terminal(&service, pending).await;
        assert_eq!(service.purge_expired(), 1);

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn retention_keeps_recent_jobs() {
        let work = temp_dir("service_retention");
        let service = service(&work, Duration::from_secs(60));

        let id = service.convert(FIXTURE, ConversionConfig::default()).unwrap();
        wait_terminal(&service, id).await;

        assert_eq!(service.purge_expired(), 0);
        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(service.purge_finished_before(later), 1);

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn shutdown_drains_and_refuses_new_jobs() {
        let work = temp_dir("service_shutdown");
        let source = many_chunk_source(&work, "many.jsonl");
        let service = service(&work, Duration::from_secs(3600));

        let id = service.convert(&source, small_chunks()).unwrap();
        service.shutdown().await;

        assert!(service.status(id).unwrap().status.is_terminal());
        assert!(service.convert(FIXTURE, ConversionConfig::default()).is_err());

        let _ = std::fs::remove_dir_all(&work);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let work = temp_dir("service_config");
        let service = service(&work, Duration::from_secs(3600));
        let config = ConversionConfig {
            target_chunk_size_bytes: 0,
            ..ConversionConfig::default()
        };
        assert!(matches!(
            service.convert(FIXTURE, config),
            Err(GraphQaError::Config { .. })
        ));
        assert_eq!(service.statistics().total_jobs, 0);

        let _ = std::fs::remove_dir_all(&work);
    }

    #[test]
    fn new_requires_a_runtime() {
        let result = GraphConversionService::new(ServiceConfig {
            work_dir: PathBuf::from("."),
            job_retention: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(GraphQaError::Worker(_))));
    }
}
