//! Sequential stage pipeline for a single route.
//!
//! Stages of one route run strictly in order: stage `n + 1` is dispatched only
//! after stage `n` settled and its status was written to the registry. Routes
//! run concurrently with each other, bounded by the worker pool.

use crate::cluster::{Job, WorkerPool};
use crate::events::TaskEvent;
use crate::scheduler::Shared;
use async_trait::async_trait;
use futures::FutureExt;
use indexmap::IndexMap;
use lantern_core::{RouteId, TaskReport, TaskStatus};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One named unit of work in the per-route pipeline.
///
/// A stage receives the name it is registered under, the worker context and
/// the report (with its own status set to `in-progress`), and returns the
/// report, possibly with artifact or score fields filled in. To signal
/// failure a stage calls [`TaskReport::fail`] with the given `stage` name;
/// the chain then stops for that route.
#[async_trait]
pub trait Stage<C>: Send + Sync + 'static {
    /// Run the stage body.
    async fn run(&self, stage: &str, context: C, report: TaskReport) -> TaskReport;
}

/// Ordered mapping of stage name to stage.
pub struct Pipeline<C> {
    stages: IndexMap<String, Arc<dyn Stage<C>>>,
}

impl<C> Pipeline<C> {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: IndexMap::new(),
        }
    }

    /// Append a stage. Re-using a name replaces the stage in place.
    #[must_use]
    pub fn stage(mut self, name: impl Into<String>, stage: impl Stage<C>) -> Self {
        self.stages.insert(name.into(), Arc::new(stage));
        self
    }

    /// Stage names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn get(&self, index: usize) -> Option<(&String, &Arc<dyn Stage<C>>)> {
        self.stages.get_index(index)
    }
}

impl<C> Default for Pipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stages.keys()).finish()
    }
}

/// Position of a route in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    /// The stage at this index is next
    Pending(usize),
    /// All stages attempted, a stage failed, or the report was requeued
    Done,
}

/// Walks one report through the pipeline.
///
/// The runner is bound to a report generation. Once the registry holds a
/// different generation for the route (it was requeued), every result of this
/// runner is discarded and the walk stops.
pub(crate) struct ChainRunner<P: WorkerPool> {
    shared: Arc<Shared<P>>,
    id: RouteId,
    path: String,
    generation: u64,
}

impl<P: WorkerPool> ChainRunner<P> {
    pub(crate) fn new(shared: Arc<Shared<P>>, report: &TaskReport) -> Self {
        Self {
            shared,
            id: report.id().clone(),
            path: report.route().path().to_string(),
            generation: report.generation(),
        }
    }

    pub(crate) async fn run(self) {
        let mut state = ChainState::Pending(0);
        while let ChainState::Pending(index) = state {
            state = self.step(index).await;
        }
    }

    async fn step(&self, index: usize) -> ChainState {
        let Some((name, stage)) = self.shared.pipeline.get(index) else {
            debug!(route = %self.path, "all stages attempted");
            return ChainState::Done;
        };
        let name = name.clone();
        let stage = Arc::clone(stage);

        let dispatched = self.with_current(|report| {
            report.set_status(&name, TaskStatus::Waiting);
            report.clone()
        });
        let Some(dispatched) = dispatched else {
            debug!(route = %self.path, stage = %name, "report was requeued, dropping chain");
            return ChainState::Done;
        };

        let job = self.job(name.clone(), stage);
        match self.shared.pool.execute(&name, dispatched, job).await {
            Ok(report) if report.status(&name) == Some(TaskStatus::Failed) => {
                warn!(route = %self.path, stage = %name, "stage failed, halting chain");
                self.write_back(report);
                ChainState::Done
            }
            Ok(mut report) => {
                report.set_status(&name, TaskStatus::Completed);
                if !self.write_back(report.clone()) {
                    debug!(route = %self.path, stage = %name, "discarding stale stage result");
                    return ChainState::Done;
                }

                debug!(route = %self.path, stage = %name, "completed task");
                self.shared.events.emit(TaskEvent::TaskComplete {
                    path: self.path.clone(),
                    report,
                    stage: name,
                });
                ChainState::Pending(index + 1)
            }
            Err(e) => {
                warn!(route = %self.path, stage = %name, error = %e, "stage could not run, halting chain");
                self.with_current(|report| report.fail(&name));
                ChainState::Done
            }
        }
    }

    /// Build the pool job: mark the stage started right before its body runs.
    fn job(&self, name: String, stage: Arc<dyn Stage<P::Context>>) -> Job<P::Context> {
        let shared = Arc::clone(&self.shared);
        let id = self.id.clone();
        let path = self.path.clone();
        let generation = self.generation;

        Box::new(move |context: P::Context, dispatched: TaskReport| {
            async move {
                let started = shared.with_current(&id, generation, |report| {
                    report.set_status(&name, TaskStatus::InProgress);
                    report.clone()
                });
                let Some(report) = started else {
                    // Requeued while waiting for a worker
                    return dispatched;
                };

                shared.events.emit(TaskEvent::TaskStarted {
                    path,
                    report: report.clone(),
                    stage: name.clone(),
                });
                stage.run(&name, context, report).await
            }
            .boxed()
        })
    }

    fn with_current<T>(&self, f: impl FnOnce(&mut TaskReport) -> T) -> Option<T> {
        self.shared.with_current(&self.id, self.generation, f)
    }

    fn write_back(&self, report: TaskReport) -> bool {
        self.shared.registry.lock().replace_current(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Stage<()> for Noop {
        async fn run(&self, _stage: &str, _context: (), report: TaskReport) -> TaskReport {
            report
        }
    }

    #[test]
    fn test_pipeline_keeps_insertion_order() {
        let pipeline = Pipeline::new()
            .stage("capture", Noop)
            .stage("score", Noop)
            .stage("archive", Noop);
        assert_eq!(pipeline.names().collect::<Vec<_>>(), vec!["capture", "score", "archive"]);
        assert_eq!(pipeline.len(), 3);
        assert_eq!(format!("{pipeline:?}"), r#"["capture", "score", "archive"]"#);
    }

    #[test]
    fn test_pipeline_replaces_duplicate_names() {
        let pipeline = Pipeline::new().stage("capture", Noop).stage("capture", Noop);
        assert_eq!(pipeline.len(), 1);
        assert!(Pipeline::<()>::default().is_empty());
    }
}
