//! Background maintenance jobs
//!
//! Two independent periodic tasks run against a cache: an expiry sweep and a
//! durable snapshot. Each is guarded against overlapping with itself and
//! both stop on `shutdown`, which then flushes a final snapshot.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::CacheError;
use crate::domain::persistence::SnapshotReport;
use crate::infrastructure::cache::IntelligentCache;
use crate::infrastructure::observability;

/// Configuration for the background jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Period of the expiry sweep, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Period of the durable snapshot, in milliseconds
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    /// Write one last snapshot when shutting down
    #[serde(default = "default_true")]
    pub flush_on_shutdown: bool,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_ms() -> u64 {
    300_000
}

fn default_snapshot_interval_ms() -> u64 {
    600_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sweep_interval_ms: default_sweep_interval_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            flush_on_shutdown: default_true(),
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.max(1))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }
}

/// Re-entrancy guard for one job
#[derive(Debug, Default)]
struct JobGuard {
    running: AtomicBool,
}

impl JobGuard {
    /// Marks the job as running, or returns `None` if it already is
    fn try_begin(&self) -> Option<JobPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobPermit { guard: self })
    }
}

struct JobPermit<'a> {
    guard: &'a JobGuard,
}

impl Drop for JobPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Handle to the running background jobs of a cache
#[derive(Debug)]
pub struct CacheScheduler {
    cache: IntelligentCache,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    sweep_guard: Arc<JobGuard>,
    snapshot_guard: Arc<JobGuard>,
    flush_on_shutdown: bool,
}

impl CacheScheduler {
    /// Spawns the sweep and snapshot jobs
    ///
    /// Both jobs wait one full period before their first run. With
    /// `enabled = false` nothing is spawned, but `shutdown` still flushes.
    pub fn start(cache: IntelligentCache, config: &SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let sweep_guard = Arc::new(JobGuard::default());
        let snapshot_guard = Arc::new(JobGuard::default());
        let mut tasks = Vec::new();

        if config.enabled {
            let sweeper = cache.clone();
            tasks.push(spawn_job(
                "sweep",
                config.sweep_interval(),
                sweep_guard.clone(),
                shutdown_tx.subscribe(),
                move || {
                    let cache = sweeper.clone();
                    async move {
                        let removed = cache.clear_expired();
                        debug!(removed, "Expiry sweep finished");
                    }
                },
            ));

            let snapshotter = cache.clone();
            tasks.push(spawn_job(
                "snapshot",
                config.snapshot_interval(),
                snapshot_guard.clone(),
                shutdown_tx.subscribe(),
                move || {
                    let cache = snapshotter.clone();
                    async move {
                        if let Err(e) = cache.persist_snapshot().await {
                            observability::record_persistence_failure("snapshot");
                            warn!(error = %e, "Scheduled snapshot failed, continuing in memory");
                        }
                    }
                },
            ));

            info!(
                sweep_interval_ms = config.sweep_interval().as_millis() as u64,
                snapshot_interval_ms = config.snapshot_interval().as_millis() as u64,
                "Cache scheduler started"
            );
        }

        Self {
            cache,
            shutdown_tx,
            tasks,
            sweep_guard,
            snapshot_guard,
            flush_on_shutdown: config.flush_on_shutdown,
        }
    }

    /// Number of spawned jobs still attached to this handle
    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }

    /// Runs the expiry sweep now, unless it is already running
    pub fn run_sweep_now(&self) -> Option<usize> {
        let _permit = self.sweep_guard.try_begin()?;
        Some(self.cache.clear_expired())
    }

    /// Writes a snapshot now, unless one is already being written
    pub async fn run_snapshot_now(&self) -> Option<Result<SnapshotReport, CacheError>> {
        let _permit = self.snapshot_guard.try_begin()?;
        Some(self.cache.persist_snapshot().await)
    }

    /// Stops both jobs, waits for them, then flushes a final snapshot
    ///
    /// A failing flush is logged and otherwise ignored.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Scheduled job ended abnormally");
            }
        }

        if self.flush_on_shutdown {
            match self.cache.persist_snapshot().await {
                Ok(report) => info!(persisted = report.persisted, "Final snapshot flushed"),
                Err(e) => {
                    observability::record_persistence_failure("shutdown");
                    warn!(error = %e, "Final snapshot failed");
                }
            }
        }

        info!("Cache scheduler stopped");
    }
}

impl Drop for CacheScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn spawn_job<F, Fut>(
    name: &'static str,
    period: Duration,
    guard: Arc<JobGuard>,
    mut shutdown_rx: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match guard.try_begin() {
                        Some(_permit) => job().await,
                        None => debug!(job = name, "Previous run still active, skipping tick"),
                    }
                }
            }
        }

        debug!(job = name, "Scheduled job stopped");
    })
}
