//! Chromium automation for the Lantern scanner.
//!
//! Provides the browser worker contexts the scanner's pool runs stages on,
//! and the built-in stages that capture page HTML and timing reports.

pub mod engine;
pub mod error;
pub mod stages;

pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use stages::{route_url, HtmlPayloadStage, PageReportStage, PageTiming};
