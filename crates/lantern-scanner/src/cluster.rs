//! Bounded worker pool that runs one stage of one report at a time per worker.
//!
//! The scheduler only talks to the pool through [`WorkerPool`]: it submits a
//! stage job and reads a [`PoolSnapshot`] for monitoring. [`Cluster`] is the
//! stock implementation: a semaphore caps concurrency at `max_workers`, and
//! each worker owns a context (a browser page, in production) obtained from a
//! [`ContextProvider`] and reused across jobs.

use crate::error::{Result, ScanError};
use crate::system::SystemMonitor;
use async_trait::async_trait;
use futures::future::BoxFuture;
use lantern_core::{TaskReport, TaskStatus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Future returned by a stage job.
pub type StageFuture = BoxFuture<'static, TaskReport>;

/// One unit of work: runs a stage body against a worker context.
pub type Job<C> = Box<dyn FnOnce(C, TaskReport) -> StageFuture + Send>;

/// Point-in-time counters of a worker pool.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    /// When the pool started
    pub started_at: Instant,
    /// Jobs ever submitted
    pub all_target_count: u64,
    /// Jobs waiting for a free worker
    pub queue_size: u64,
    /// Jobs currently holding a worker
    pub workers_busy: u64,
    /// Launched workers
    pub workers: u64,
    /// Workers being launched
    pub workers_starting: u64,
    /// Failed launches, panicked jobs and jobs that reported a failed stage
    pub error_count: u64,
    /// System CPU usage in percent
    pub cpu_usage: f64,
    /// System memory usage in percent
    pub memory_usage: f64,
}

/// Executes stage jobs under a concurrency bound.
#[async_trait]
pub trait WorkerPool: Send + Sync + 'static {
    /// Per-worker context handed to stage bodies.
    type Context: Clone + Send + Sync + 'static;

    /// Run `job` for `stage` of `report` on a worker and return the report the
    /// job produced.
    async fn execute(
        &self,
        stage: &str,
        report: TaskReport,
        job: Job<Self::Context>,
    ) -> Result<TaskReport>;

    /// Current counters.
    fn snapshot(&self) -> PoolSnapshot;
}

/// Creates and disposes of worker contexts.
#[async_trait]
pub trait ContextProvider: Send + Sync + 'static {
    /// Context owned by one worker.
    type Context: Clone + Send + Sync + 'static;

    /// Launch a new worker context.
    async fn launch(&self) -> Result<Self::Context>;

    /// Dispose of a context when the pool closes.
    async fn release(&self, _context: Self::Context) {}
}

/// Increments a counter for as long as the guard lives.
struct CounterGuard<'a> {
    counter: &'a AtomicU64,
}

impl<'a> CounterGuard<'a> {
    fn new(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Counters {
    all_targets: AtomicU64,
    queued: AtomicU64,
    busy: AtomicU64,
    workers: AtomicU64,
    starting: AtomicU64,
    errors: AtomicU64,
}

/// Semaphore-bounded pool of reusable worker contexts.
pub struct Cluster<P: ContextProvider> {
    provider: P,
    permits: Semaphore,
    idle: Mutex<Vec<P::Context>>,
    counters: Counters,
    started_at: Instant,
    system: SystemMonitor,
    max_workers: usize,
}

impl<P: ContextProvider> Cluster<P> {
    /// Create a pool running at most `max_workers` jobs at once.
    ///
    /// Workers are launched lazily, on the first job that finds no idle
    /// context.
    #[must_use]
    pub fn new(provider: P, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            provider,
            permits: Semaphore::new(max_workers),
            idle: Mutex::new(Vec::with_capacity(max_workers)),
            counters: Counters::default(),
            started_at: Instant::now(),
            system: SystemMonitor::new(),
            max_workers,
        }
    }

    /// Concurrency bound.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Stop accepting jobs and release idle workers.
    ///
    /// Jobs waiting for a worker fail with [`ScanError::PoolClosed`]; running
    /// jobs finish and their workers are released afterwards.
    pub async fn close(&self) {
        self.permits.close();
        let idle = std::mem::take(&mut *self.idle.lock());
        for context in idle {
            self.release_worker(context).await;
        }
        debug!("worker pool closed");
    }

    async fn launch_worker(&self) -> Result<P::Context> {
        let _starting = CounterGuard::new(&self.counters.starting);
        match self.provider.launch().await {
            Ok(context) => {
                let workers = self.counters.workers.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(workers, max_workers = self.max_workers, "launched worker");
                Ok(context)
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "failed to launch worker");
                Err(e)
            }
        }
    }

    async fn release_worker(&self, context: P::Context) {
        self.provider.release(context).await;
        self.counters.workers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<P: ContextProvider> WorkerPool for Cluster<P> {
    type Context = P::Context;

    async fn execute(
        &self,
        stage: &str,
        report: TaskReport,
        job: Job<Self::Context>,
    ) -> Result<TaskReport> {
        self.counters.all_targets.fetch_add(1, Ordering::SeqCst);

        let permit = {
            let _queued = CounterGuard::new(&self.counters.queued);
            self.permits.acquire().await
        };
        let Ok(_permit) = permit else {
            return Err(ScanError::PoolClosed);
        };
        let _busy = CounterGuard::new(&self.counters.busy);

        let idle = self.idle.lock().pop();
        let context = match idle {
            Some(context) => context,
            None => self.launch_worker().await?,
        };

        let route = report.id().to_string();
        let outcome = tokio::spawn(job(context.clone(), report)).await;

        if self.permits.is_closed() {
            self.release_worker(context).await;
        } else {
            self.idle.lock().push(context);
        }

        match outcome {
            Ok(report) => {
                if report.status(stage) == Some(TaskStatus::Failed) {
                    self.counters.errors.fetch_add(1, Ordering::SeqCst);
                }
                Ok(report)
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::SeqCst);
                warn!(stage, route = %route, error = %e, "stage job did not finish");
                Err(ScanError::StagePanicked {
                    stage: stage.to_string(),
                    route,
                })
            }
        }
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            started_at: self.started_at,
            all_target_count: self.counters.all_targets.load(Ordering::SeqCst),
            queue_size: self.counters.queued.load(Ordering::SeqCst),
            workers_busy: self.counters.busy.load(Ordering::SeqCst),
            workers: self.counters.workers.load(Ordering::SeqCst),
            workers_starting: self.counters.starting.load(Ordering::SeqCst),
            error_count: self.counters.errors.load(Ordering::SeqCst),
            cpu_usage: self.system.cpu_usage(),
            memory_usage: self.system.memory_usage(),
        }
    }
}
