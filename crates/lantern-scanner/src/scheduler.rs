//! Route queue controller.
//!
//! [`RouteScheduler`] is the public surface of the scanner: it admits routes
//! through the sampling gate into the registry, starts one chain runner per
//! admitted route, handles invalidation and exposes read snapshots.

use crate::chain::{ChainRunner, Pipeline};
use crate::cluster::WorkerPool;
use crate::events::{EventBus, TaskEvent};
use crate::monitor::WorkerStats;
use crate::registry::ReportRegistry;
use crate::sampling::SamplingGate;
use lantern_core::{AppConfig, GroupRoutesKey, Route, RouteId, TaskReport};
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of [`RouteScheduler::queue_route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A report was created and the stage chain started
    Queued,
    /// A report for this route already exists
    Duplicate,
    /// The route's group already holds the sampling limit
    Sampled,
}

impl Admission {
    /// Whether the route was admitted.
    #[must_use]
    pub fn is_queued(self) -> bool {
        self == Self::Queued
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Per-group admission cap; zero or less disables sampling
    pub dynamic_sampling: i64,
    /// Route attribute used for sampling groups and sorting
    pub group_routes_key: GroupRoutesKey,
    /// Debounce before a requeued route is admitted again
    pub requeue_delay: Duration,
    /// Root directory for report artifacts
    pub output_path: PathBuf,
    /// Buffered lifecycle events per subscriber
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            dynamic_sampling: config.scanner.dynamic_sampling,
            group_routes_key: config.client.group_routes_key,
            requeue_delay: config.scanner.requeue_delay(),
            output_path: config.output_path.clone(),
            event_capacity: config.scanner.event_capacity,
        }
    }
}

/// State shared between the scheduler handle and its chain runners.
pub(crate) struct Shared<P: WorkerPool> {
    pub(crate) pool: Arc<P>,
    pub(crate) pipeline: Pipeline<P::Context>,
    pub(crate) registry: Mutex<ReportRegistry>,
    pub(crate) events: EventBus,
    gate: SamplingGate,
    output_path: PathBuf,
    requeue_delay: Duration,
}

impl<P: WorkerPool> Shared<P> {
    /// Run `f` on the stored report if it is still `generation`.
    pub(crate) fn with_current<T>(
        &self,
        id: &RouteId,
        generation: u64,
        f: impl FnOnce(&mut TaskReport) -> T,
    ) -> Option<T> {
        self.registry.lock().get_current_mut(id, generation).map(f)
    }
}

/// Admits routes and drives their stage chains on a worker pool.
///
/// The handle is cheap to clone; all clones share one registry. Admission
/// never waits on the pool: stage chains run on spawned tasks, so the methods
/// that start work must be called from within a Tokio runtime.
pub struct RouteScheduler<P: WorkerPool> {
    shared: Arc<Shared<P>>,
}

impl<P: WorkerPool> Clone for RouteScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: WorkerPool> RouteScheduler<P> {
    /// Create a scheduler running `pipeline` on `pool`.
    #[must_use]
    pub fn new(pool: Arc<P>, pipeline: Pipeline<P::Context>, config: SchedulerConfig) -> Self {
        info!(
            stages = ?pipeline,
            dynamic_sampling = config.dynamic_sampling,
            group_routes_key = ?config.group_routes_key,
            "route scheduler ready"
        );

        Self {
            shared: Arc::new(Shared {
                pool,
                pipeline,
                registry: Mutex::new(ReportRegistry::new()),
                events: EventBus::new(config.event_capacity),
                gate: SamplingGate::new(config.dynamic_sampling, config.group_routes_key),
                output_path: config.output_path,
                requeue_delay: config.requeue_delay,
            }),
        }
    }

    /// The worker pool stages run on.
    #[must_use]
    pub fn pool(&self) -> &Arc<P> {
        &self.shared.pool
    }

    /// Admit a single route.
    ///
    /// A route whose ID is already registered is ignored. Otherwise the
    /// sampling gate decides; an admitted route gets a fresh report, a
    /// `task-added` event, and its stage chain starts in the background.
    pub fn queue_route(&self, route: Route) -> Admission {
        let shared = &self.shared;

        let report = {
            let mut registry = shared.registry.lock();
            if registry.contains(route.id()) {
                return Admission::Duplicate;
            }
            if !shared.gate.admit(&route, &registry) {
                debug!(
                    route = %route.path(),
                    group = shared.gate.key().group_of(&route),
                    "sampling limit reached, skipping route"
                );
                return Admission::Sampled;
            }

            let generation = registry.next_generation();
            let report = TaskReport::new(
                route,
                shared.pipeline.names(),
                &shared.output_path,
                generation,
            );
            registry.insert(report.clone());
            report
        };

        let path = report.route().path().to_string();
        debug!(route = %path, "queued route");

        let runner = ChainRunner::new(Arc::clone(shared), &report);
        shared.events.emit(TaskEvent::TaskAdded { path, report });
        tokio::spawn(runner.run());

        Admission::Queued
    }

    /// Admit many routes, grouped so routes of one group are considered
    /// back to back. Routes of the same group keep their input order.
    ///
    /// Returns the number of routes admitted.
    pub fn queue_routes(&self, routes: impl IntoIterator<Item = Route>) -> usize {
        let key = self.shared.gate.key();
        let mut routes: Vec<Route> = routes.into_iter().collect();
        routes.sort_by(|a, b| key.group_of(a).cmp(key.group_of(b)));

        let total = routes.len();
        let queued = routes
            .into_iter()
            .map(|route| self.queue_route(route))
            .filter(|admission| admission.is_queued())
            .count();

        info!(queued, total, "queued routes");
        queued
    }

    /// Discard a report and schedule its route to be queued again.
    ///
    /// Artifact files are deleted (missing files are ignored) and the report
    /// leaves the registry before this returns. After the requeue delay the
    /// route is admitted again under the same ID. A stage still running for
    /// the old report finishes, but its result is dropped.
    pub fn requeue_report(&self, report: &TaskReport) -> JoinHandle<Admission> {
        info!(route = %report.route().path(), "requeueing report");
        for artifact in report.artifact_paths() {
            remove_artifact(artifact);
        }
        self.shared.registry.lock().remove(report.id());

        let route = report.route().clone();
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(scheduler.shared.requeue_delay).await;
            scheduler.queue_route(route)
        })
    }

    /// Requeue every report whose route is defined by `file`.
    ///
    /// Returns whether any report matched.
    pub fn invalidate_file(&self, file: &Path) -> bool {
        let matched: Vec<TaskReport> = self
            .shared
            .registry
            .lock()
            .iter()
            .filter(|report| report.route().is_defined_by(file))
            .cloned()
            .collect();

        if matched.is_empty() {
            debug!(file = %file.display(), "no reports defined by file");
            return false;
        }

        info!(file = %file.display(), reports = matched.len(), "invalidating file");
        for report in &matched {
            self.requeue_report(report);
        }
        true
    }

    /// Whether the pool has at least one active or starting worker.
    #[must_use]
    pub fn has_started(&self) -> bool {
        let snapshot = self.shared.pool.snapshot();
        snapshot.workers + snapshot.workers_starting > 0
    }

    /// Snapshot of every report, in admission order.
    #[must_use]
    pub fn reports(&self) -> Vec<TaskReport> {
        self.shared.registry.lock().iter().cloned().collect()
    }

    /// Snapshot of one report.
    #[must_use]
    pub fn find_report(&self, id: &RouteId) -> Option<TaskReport> {
        self.shared.registry.lock().get(id).cloned()
    }

    /// Number of reports with a stage that has not settled yet.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.shared
            .registry
            .lock()
            .iter()
            .filter(|report| !report.is_settled())
            .count()
    }

    /// Progress statistics for the pool.
    #[must_use]
    pub fn monitor(&self) -> WorkerStats {
        let snapshot = self.shared.pool.snapshot();
        WorkerStats::compute(&snapshot, snapshot.started_at.elapsed())
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }
}

fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::ScannerConfig;

    #[test]
    fn test_config_from_app_config() {
        let app = AppConfig {
            output_path: PathBuf::from("/tmp/out"),
            scanner: ScannerConfig {
                dynamic_sampling: 2,
                requeue_delay_ms: 10,
                ..ScannerConfig::default()
            },
            ..AppConfig::default()
        };

        let config = SchedulerConfig::from(&app);
        assert_eq!(config.dynamic_sampling, 2);
        assert_eq!(config.requeue_delay, Duration::from_millis(10));
        assert_eq!(config.output_path, PathBuf::from("/tmp/out"));
        assert_eq!(config.group_routes_key, GroupRoutesKey::DefinitionName);
    }

    #[test]
    fn test_admission_is_queued() {
        assert!(Admission::Queued.is_queued());
        assert!(!Admission::Duplicate.is_queued());
        assert!(!Admission::Sampled.is_queued());
    }

    #[test]
    fn test_remove_artifact() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("payload.html");
        std::fs::write(&path, "<html></html>").expect("write artifact");

        remove_artifact(&path);
        assert!(!path.exists());
        // Already gone
        remove_artifact(&path);
    }
}
