//! Process memory ceiling with a two-tier cleanup policy.
//!
//! Above 80% of the ceiling one cleanup round runs. Above 90% up to three
//! rounds run, re-measuring after each; if usage is still above 90% the
//! caller gets [`GraphQaError::MemoryBudgetExceeded`] instead of the
//! process running into the OOM killer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{error, warn};

use graphqa_shared::{GraphQaError, Result};

pub const WARNING_RATIO: f64 = 0.80;
pub const FORCED_RATIO: f64 = 0.90;
pub const FORCED_CLEANUP_ROUNDS: usize = 3;

/// Source of the current memory usage figure, in bytes.
pub trait MemoryProbe: Send + Sync {
    fn current_usage(&self) -> u64;
}

/// Resident set size of this process, read through `sysinfo`.
pub struct ProcessMemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!(error = e, "cannot determine own pid, memory reads as 0"))
            .ok();
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn current_usage(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

type CleanupHook = Box<dyn Fn() + Send + Sync>;

/// Snapshot of monitor counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub current_bytes: u64,
    pub peak_bytes: u64,
    pub limit_bytes: u64,
    pub cleanups: u64,
}

/// Enforces a memory ceiling around processing steps.
pub struct MemoryMonitor {
    max_usage_bytes: u64,
    probe: Box<dyn MemoryProbe>,
    hooks: Mutex<Vec<CleanupHook>>,
    peak: AtomicU64,
    cleanups: AtomicU64,
}

impl MemoryMonitor {
    /// Monitor this process's RSS against `max_usage_bytes`.
    pub fn new(max_usage_bytes: u64) -> Self {
        Self::with_probe(max_usage_bytes, ProcessMemoryProbe::new())
    }

    pub fn with_probe(max_usage_bytes: u64, probe: impl MemoryProbe + 'static) -> Self {
        Self {
            max_usage_bytes,
            probe: Box::new(probe),
            hooks: Mutex::new(Vec::new()),
            peak: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
        }
    }

    pub fn warning_threshold(&self) -> u64 {
        (self.max_usage_bytes as f64 * WARNING_RATIO) as u64
    }

    pub fn forced_threshold(&self) -> u64 {
        (self.max_usage_bytes as f64 * FORCED_RATIO) as u64
    }

    /// Register a hook run on every cleanup round (drop caches, shrink buffers).
    pub fn register_cleanup(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Measure usage now and update the high-water mark.
    pub fn current_usage(&self) -> u64 {
        let usage = self.probe.current_usage();
        self.peak.fetch_max(usage, Ordering::Relaxed);
        usage
    }

    /// Apply the cleanup policy. Returns whether any cleanup ran.
    pub fn check_and_cleanup(&self) -> Result<bool> {
        let usage = self.current_usage();

        if usage > self.forced_threshold() {
            let mut after = usage;
            let mut rounds = 0;
            while rounds < FORCED_CLEANUP_ROUNDS {
                rounds += 1;
                self.run_hooks();
                after = self.current_usage();
                if after <= self.forced_threshold() {
                    break;
                }
            }
            self.cleanups.fetch_add(1, Ordering::Relaxed);
            warn!(
                event = "memory_cleanup",
                tier = "forced",
                usage_bytes = usage,
                after_bytes = after,
                limit_bytes = self.max_usage_bytes,
                rounds,
                "forced memory cleanup"
            );

            if after > self.forced_threshold() {
                error!(
                    usage_bytes = after,
                    limit_bytes = self.max_usage_bytes,
                    "memory budget exceeded after forced cleanup"
                );
                return Err(GraphQaError::MemoryBudgetExceeded {
                    usage_bytes: after,
                    limit_bytes: self.max_usage_bytes,
                });
            }
            return Ok(true);
        }

        if usage > self.warning_threshold() {
            self.run_hooks();
            self.cleanups.fetch_add(1, Ordering::Relaxed);
            warn!(
                event = "memory_cleanup",
                tier = "warning",
                usage_bytes = usage,
                limit_bytes = self.max_usage_bytes,
                rounds = 1,
                "memory above warning threshold"
            );
            return Ok(true);
        }

        Ok(false)
    }

    /// Run `block`, then apply the cleanup policy.
    pub fn with_monitoring<T>(&self, block: impl FnOnce() -> Result<T>) -> Result<T> {
        let out = block()?;
        self.check_and_cleanup()?;
        Ok(out)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            current_bytes: self.current_usage(),
            peak_bytes: self.peak.load(Ordering::Relaxed),
            limit_bytes: self.max_usage_bytes,
            cleanups: self.cleanups.load(Ordering::Relaxed),
        }
    }

    fn run_hooks(&self) {
        let hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook();
        }
    }
}
