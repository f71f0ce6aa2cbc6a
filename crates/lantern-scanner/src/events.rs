//! Lifecycle notifications for queued routes.
//!
//! Events are fanned out over a `tokio::sync::broadcast` channel. A slow
//! subscriber that falls more than the configured capacity behind receives
//! `RecvError::Lagged` and skips ahead; the scheduler itself never waits on
//! subscribers.

use lantern_core::TaskReport;
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

/// The fixed set of lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskEventKind {
    /// A route was admitted and its report registered
    TaskAdded,
    /// A stage body started on a worker
    TaskStarted,
    /// A stage completed successfully
    TaskComplete,
}

impl TaskEventKind {
    /// Wire name, e.g. `task-added`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskAdded => "task-added",
            Self::TaskStarted => "task-started",
            Self::TaskComplete => "task-complete",
        }
    }
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification carrying the route path and a report snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TaskEvent {
    /// A route was admitted
    TaskAdded {
        /// Route path
        path: String,
        /// Freshly created report
        report: TaskReport,
    },
    /// A stage started running
    TaskStarted {
        /// Route path
        path: String,
        /// Report with the stage marked `in-progress`
        report: TaskReport,
        /// Stage name
        stage: String,
    },
    /// A stage completed
    TaskComplete {
        /// Route path
        path: String,
        /// Report with the stage marked `completed`
        report: TaskReport,
        /// Stage name
        stage: String,
    },
}

impl TaskEvent {
    /// Which kind of event this is.
    #[must_use]
    pub fn kind(&self) -> TaskEventKind {
        match self {
            Self::TaskAdded { .. } => TaskEventKind::TaskAdded,
            Self::TaskStarted { .. } => TaskEventKind::TaskStarted,
            Self::TaskComplete { .. } => TaskEventKind::TaskComplete,
        }
    }

    /// Route path the event is about.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::TaskAdded { path, .. }
            | Self::TaskStarted { path, .. }
            | Self::TaskComplete { path, .. } => path,
        }
    }

    /// Report snapshot carried by the event.
    #[must_use]
    pub fn report(&self) -> &TaskReport {
        match self {
            Self::TaskAdded { report, .. }
            | Self::TaskStarted { report, .. }
            | Self::TaskComplete { report, .. } => report,
        }
    }

    /// Stage name, for stage events.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::TaskAdded { .. } => None,
            Self::TaskStarted { stage, .. } | Self::TaskComplete { stage, .. } => Some(stage),
        }
    }
}

/// Broadcasts [`TaskEvent`]s to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber. It only sees events sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Deliver an event. Having no subscribers is not an error.
    pub fn emit(&self, event: TaskEvent) {
        let kind = event.kind();
        if self.sender.send(event).is_err() {
            trace!(event = %kind, "no subscribers for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::Route;
    use std::path::Path;

    fn report() -> TaskReport {
        let route = Route::new("/about").expect("valid route");
        TaskReport::new(route, ["capture"], Path::new("out"), 0)
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(TaskEvent::TaskAdded {
            path: "/about".to_string(),
            report: report(),
        });

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.expect("receive event");
            assert_eq!(event.kind(), TaskEventKind::TaskAdded);
            assert_eq!(event.path(), "/about");
            assert_eq!(event.stage(), None);
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(1);
        bus.emit(TaskEvent::TaskComplete {
            path: "/about".to_string(),
            report: report(),
            stage: "capture".to_string(),
        });
    }

    #[test]
    fn test_event_serialization() {
        let event = TaskEvent::TaskStarted {
            path: "/about".to_string(),
            report: report(),
            stage: "capture".to_string(),
        };
        let json = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(json["event"], "task-started");
        assert_eq!(json["stage"], "capture");
        assert_eq!(json["report"]["tasks"]["capture"], "waiting");
        assert_eq!(TaskEventKind::TaskComplete.to_string(), "task-complete");
    }
}
