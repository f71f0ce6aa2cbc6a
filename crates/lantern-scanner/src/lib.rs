//! Lantern Scanner - Route queue and stage scheduling.
//!
//! This crate admits site routes into a report registry, samples dynamic
//! route groups down to a configurable cap, and walks every admitted route
//! through an ordered pipeline of stages on a bounded worker pool.
//!
//! # Features
//!
//! - Idempotent admission keyed by route ID
//! - Per-group sampling of dynamic routes
//! - Strictly sequential stages per route, concurrent across routes
//! - Debounced requeue and source-file invalidation
//! - Lifecycle events and progress monitoring
//!
//! # Example
//!
//! ```rust,ignore
//! use lantern_scanner::{Cluster, Pipeline, RouteScheduler, SchedulerConfig};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(Cluster::new(browser_engine, 4));
//! let pipeline = Pipeline::new()
//!     .stage("runLighthouseTask", PageReportStage::new(site));
//! let scheduler = RouteScheduler::new(pool, pipeline, SchedulerConfig::default());
//!
//! scheduler.queue_routes(routes);
//! let stats = scheduler.monitor();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod chain;
pub mod cluster;
pub mod error;
pub mod events;
#[allow(missing_docs)]
pub mod monitor;
pub mod registry;
pub mod sampling;
pub mod scheduler;
pub mod system;

// Re-export commonly used types
pub use chain::{Pipeline, Stage};
pub use cluster::{Cluster, ContextProvider, Job, PoolSnapshot, StageFuture, WorkerPool};
pub use error::{Result, ScanError};
pub use events::{EventBus, TaskEvent, TaskEventKind};
pub use monitor::{ScanStatus, WorkerStats, UNKNOWN_TIME_REMAINING};
pub use registry::ReportRegistry;
pub use sampling::SamplingGate;
pub use scheduler::{Admission, RouteScheduler, SchedulerConfig};
pub use system::SystemMonitor;
