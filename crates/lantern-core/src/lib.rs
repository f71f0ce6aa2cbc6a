//! Lantern Core - Foundation crate for the Lantern route scanner.
//!
//! This crate provides the shared types, error handling and configuration
//! that the scanner, browser and CLI crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`route`] - Routes, route IDs and group keys
//! - [`report`] - Per-route task reports and stage statuses
//!
//! # Example
//!
//! ```rust
//! use lantern_core::{AppConfig, Route, TaskReport, TaskStatus};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let route = Route::new("/about")?;
//! let report = TaskReport::new(route, ["capture"], &config.output_path, 0);
//! assert_eq!(report.status("capture"), Some(TaskStatus::Waiting));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod report;
pub mod route;

// Re-export commonly used types
pub use config::{AppConfig, BrowserConfig, ClientConfig, ScannerConfig};
pub use error::{ConfigError, ConfigResult, LanternError};
pub use report::{TaskReport, TaskStatus};
pub use route::{
    CustomSampling, CustomSamplingEntry, GroupRoutesKey, Route, RouteDefinition, RouteId,
};
