//! Per-route task reports.
//!
//! A [`TaskReport`] records how far a route has progressed through the stage
//! pipeline, along with the artifact paths the stages write to.

use crate::route::{Route, RouteId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory under the output path that holds per-route artifacts.
pub const REPORTS_DIR: &str = "reports";

/// Status of a single pipeline stage for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Not started yet
    Waiting,
    /// Stage body is running on a worker
    InProgress,
    /// Stage finished successfully
    Completed,
    /// Stage reported a failure; the chain stops here
    Failed,
}

impl TaskStatus {
    /// Whether the status can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name, e.g. `in-progress`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable task-progress record for one admitted route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    id: RouteId,
    route: Route,
    generation: u64,
    /// Stage name to status, in pipeline order
    pub tasks: IndexMap<String, TaskStatus>,
    /// Captured HTML of the rendered page
    pub html_payload: PathBuf,
    /// Rendered HTML report
    pub report_html: PathBuf,
    /// Machine-readable JSON report
    pub report_json: PathBuf,
    /// Aggregate score, if a stage computed one
    pub score: Option<f64>,
    /// When the report was created
    pub created_at: DateTime<Utc>,
}

impl TaskReport {
    /// Create a fresh report with every stage `waiting`.
    ///
    /// Artifact paths are laid out under `<output_path>/reports/<route id>/`.
    /// `generation` distinguishes this report from earlier reports of the same
    /// route that were discarded by a requeue.
    #[must_use]
    pub fn new<I, S>(route: Route, stages: I, output_path: &Path, generation: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let artifact_dir = output_path.join(REPORTS_DIR).join(route.id().as_str());
        Self {
            id: route.id().clone(),
            html_payload: artifact_dir.join("payload.html"),
            report_html: artifact_dir.join("lighthouse.html"),
            report_json: artifact_dir.join("lighthouse.json"),
            tasks: stages
                .into_iter()
                .map(|name| (name.into(), TaskStatus::Waiting))
                .collect(),
            route,
            generation,
            score: None,
            created_at: Utc::now(),
        }
    }

    /// Report identifier, identical to the route ID.
    #[must_use]
    pub fn id(&self) -> &RouteId {
        &self.id
    }

    /// The route this report belongs to.
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Registry generation this report was created in.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Status of a stage, if the stage is part of this report.
    #[must_use]
    pub fn status(&self, stage: &str) -> Option<TaskStatus> {
        self.tasks.get(stage).copied()
    }

    /// Update a stage's status.
    ///
    /// Terminal statuses never regress; returns `false` if the update was
    /// refused or the stage is unknown.
    pub fn set_status(&mut self, stage: &str, status: TaskStatus) -> bool {
        match self.tasks.get_mut(stage) {
            Some(current) if !current.is_terminal() => {
                *current = status;
                true
            }
            _ => false,
        }
    }

    /// Mark a stage as failed. Stages call this to stop the chain.
    pub fn fail(&mut self, stage: &str) -> bool {
        self.set_status(stage, TaskStatus::Failed)
    }

    /// Whether any stage failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.tasks.values().any(|s| *s == TaskStatus::Failed)
    }

    /// Whether the report will not change any more: every stage completed,
    /// or the chain halted on a failure.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.has_failed() || self.tasks.values().all(|s| s.is_terminal())
    }

    /// Artifact files written by stages, in deletion order.
    #[must_use]
    pub fn artifact_paths(&self) -> [&Path; 3] {
        [&self.report_html, &self.report_json, &self.html_payload]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> TaskReport {
        let route = Route::new("/docs").expect("valid route");
        TaskReport::new(route, ["capture", "score"], Path::new("/tmp/out"), 7)
    }

    #[test]
    fn test_new_report_is_waiting() {
        let report = report();
        assert_eq!(report.id().as_str(), report.route().id().as_str());
        assert_eq!(report.generation(), 7);
        assert_eq!(
            report.tasks.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["capture", "score"]
        );
        assert!(report.tasks.values().all(|s| *s == TaskStatus::Waiting));
        assert!(!report.is_settled());
    }

    #[test]
    fn test_artifact_layout() {
        let report = report();
        let dir = Path::new("/tmp/out/reports").join(report.id().as_str());
        assert_eq!(report.html_payload, dir.join("payload.html"));
        assert_eq!(report.report_html, dir.join("lighthouse.html"));
        assert_eq!(report.report_json, dir.join("lighthouse.json"));
    }

    #[test]
    fn test_terminal_status_never_regresses() {
        let mut report = report();
        assert!(report.set_status("capture", TaskStatus::InProgress));
        assert!(report.set_status("capture", TaskStatus::Completed));
        assert!(!report.set_status("capture", TaskStatus::Waiting));
        assert_eq!(report.status("capture"), Some(TaskStatus::Completed));

        assert!(report.fail("score"));
        assert!(!report.set_status("score", TaskStatus::Completed));
        assert_eq!(report.status("score"), Some(TaskStatus::Failed));
    }

    #[test]
    fn test_unknown_stage() {
        let mut report = report();
        assert!(!report.set_status("missing", TaskStatus::Completed));
        assert_eq!(report.status("missing"), None);
    }

    #[test]
    fn test_settled_on_failure() {
        let mut report = report();
        report.fail("capture");
        assert!(report.has_failed());
        assert!(report.is_settled());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::InProgress).expect("serialize status");
        assert_eq!(json, "\"in-progress\"");
        assert_eq!(TaskStatus::InProgress.to_string(), "in-progress");
    }
}
