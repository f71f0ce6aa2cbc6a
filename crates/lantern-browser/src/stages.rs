//! Built-in pipeline stages that drive a Chromium page.
//!
//! Stages never return errors to the scheduler. Any browser or filesystem
//! failure is logged and the stage marks itself `failed` on the report, which
//! halts the chain for that route.

use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use lantern_core::TaskReport;
use lantern_scanner::Stage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Build the absolute URL of a route on `site`.
///
/// The route path is appended to the site URL, so a site mounted under a
/// sub-path (`https://example.com/docs/`) keeps its prefix.
pub fn route_url(site: &Url, route_path: &str) -> Result<Url> {
    let base = site.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}{route_path}"))
        .map_err(|e| BrowserError::InvalidUrl(format!("{base}{route_path}: {e}")))
}

fn parse_site(site: &str) -> Result<Url> {
    let url = Url::parse(site).map_err(|e| BrowserError::InvalidUrl(format!("{site}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(BrowserError::InvalidUrl(format!("{site}: not a base URL")));
    }
    Ok(url)
}

async fn navigate(page: &Page, url: &Url, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(BrowserError::NavigationError(format!("{url}: {e}"))),
        Err(_) => Err(BrowserError::Timeout(format!(
            "{url} did not load within {}s",
            timeout.as_secs()
        ))),
    }
}

async fn write_artifact(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Navigates to the route and saves the rendered HTML to `html_payload`.
#[derive(Debug, Clone)]
pub struct HtmlPayloadStage {
    site: Url,
    timeout: Duration,
}

impl HtmlPayloadStage {
    /// Default stage name used in reports.
    pub const NAME: &'static str = "inspectHtmlTask";

    /// Create the stage for `site`.
    pub fn new(site: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            site: parse_site(site)?,
            timeout,
        })
    }

    async fn capture(&self, page: &Page, report: &TaskReport) -> Result<()> {
        let url = route_url(&self.site, report.route().path())?;
        navigate(page, &url, self.timeout).await?;

        let html = page.content().await?;
        write_artifact(&report.html_payload, html.as_bytes()).await?;
        debug!(route = %report.route().path(), bytes = html.len(), "saved html payload");
        Ok(())
    }
}

#[async_trait]
impl Stage<Page> for HtmlPayloadStage {
    async fn run(&self, stage: &str, page: Page, mut report: TaskReport) -> TaskReport {
        if let Err(e) = self.capture(&page, &report).await {
            warn!(route = %report.route().path(), stage, error = %e, "html capture failed");
            report.fail(stage);
        }
        report
    }
}

const NAVIGATION_TIMING_SCRIPT: &str = r"(() => {
  const [nav] = performance.getEntriesByType('navigation');
  if (!nav) return null;
  return {
    ttfb: nav.responseStart - nav.requestStart,
    domContentLoaded: nav.domContentLoadedEventEnd - nav.startTime,
    load: nav.loadEventEnd - nav.startTime,
    transferSize: nav.transferSize,
  };
})()";

/// Navigation timing of one page load, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTiming {
    /// Request start to first response byte
    pub ttfb: f64,
    /// Navigation start to `DOMContentLoaded` handled
    pub dom_content_loaded: f64,
    /// Navigation start to `load` handled
    pub load: f64,
    /// Bytes transferred for the document
    pub transfer_size: f64,
}

/// Load time at or below which a page scores 1.0.
const FAST_LOAD_MS: f64 = 1_000.0;
/// Load time at or above which a page scores 0.0.
const SLOW_LOAD_MS: f64 = 10_000.0;

impl PageTiming {
    /// Score in `0.0..=1.0`, linear in load time between the fast and slow
    /// thresholds, rounded to two decimals.
    #[must_use]
    pub fn score(&self) -> f64 {
        let ratio = (SLOW_LOAD_MS - self.load) / (SLOW_LOAD_MS - FAST_LOAD_MS);
        (ratio.clamp(0.0, 1.0) * 100.0).round() / 100.0
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageReport<'a> {
    path: &'a str,
    url: &'a str,
    score: f64,
    timing: PageTiming,
}

/// Measures navigation timing and writes the JSON and HTML reports.
#[derive(Debug, Clone)]
pub struct PageReportStage {
    site: Url,
    timeout: Duration,
}

impl PageReportStage {
    /// Default stage name used in reports.
    pub const NAME: &'static str = "runLighthouseTask";

    /// Create the stage for `site`.
    pub fn new(site: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            site: parse_site(site)?,
            timeout,
        })
    }

    async fn measure(&self, page: &Page, report: &mut TaskReport) -> Result<()> {
        let url = route_url(&self.site, report.route().path())?;
        navigate(page, &url, self.timeout).await?;

        let timing: Option<PageTiming> = page
            .evaluate(NAVIGATION_TIMING_SCRIPT)
            .await?
            .into_value()
            .map_err(|e| BrowserError::EvaluationError(e.to_string()))?;
        let timing = timing.ok_or_else(|| {
            BrowserError::EvaluationError(format!("no navigation timing for {url}"))
        })?;

        let page_report = PageReport {
            path: report.route().path(),
            url: url.as_str(),
            score: timing.score(),
            timing,
        };
        write_artifact(&report.report_json, &serde_json::to_vec_pretty(&page_report)?).await?;
        write_artifact(&report.report_html, render_html(&page_report).as_bytes()).await?;

        debug!(route = %page_report.path, score = page_report.score, "saved page report");
        report.score = Some(page_report.score);
        Ok(())
    }
}

#[async_trait]
impl Stage<Page> for PageReportStage {
    async fn run(&self, stage: &str, page: Page, mut report: TaskReport) -> TaskReport {
        if let Err(e) = self.measure(&page, &mut report).await {
            warn!(route = %report.route().path(), stage, error = %e, "page report failed");
            report.fail(stage);
        }
        report
    }
}

fn render_html(report: &PageReport<'_>) -> String {
    let path = escape_html(report.path);
    let url = escape_html(report.url);
    let t = &report.timing;
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{path}</title></head>\n<body>\n\
         <h1>{path}</h1>\n<p><a href=\"{url}\">{url}</a></p>\n<p>Score: {score:.2}</p>\n<table>\n\
         <tr><th>Time to first byte</th><td>{ttfb:.0} ms</td></tr>\n\
         <tr><th>DOM content loaded</th><td>{dcl:.0} ms</td></tr>\n\
         <tr><th>Load</th><td>{load:.0} ms</td></tr>\n\
         <tr><th>Transfer size</th><td>{size:.0} B</td></tr>\n</table>\n</body>\n</html>\n",
        score = report.score,
        ttfb = t.ttfb,
        dcl = t.dom_content_loaded,
        load = t.load,
        size = t.transfer_size,
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(load: f64) -> PageTiming {
        PageTiming {
            ttfb: 40.0,
            dom_content_loaded: load / 2.0,
            load,
            transfer_size: 2048.0,
        }
    }

    #[test]
    fn test_route_url() {
        let site = Url::parse("https://example.com").unwrap();
        assert_eq!(
            route_url(&site, "/about").unwrap().as_str(),
            "https://example.com/about"
        );
        assert_eq!(route_url(&site, "/").unwrap().as_str(), "https://example.com/");
    }

    #[test]
    fn test_route_url_keeps_site_prefix() {
        let site = Url::parse("https://example.com/docs/").unwrap();
        assert_eq!(
            route_url(&site, "/guide/intro").unwrap().as_str(),
            "https://example.com/docs/guide/intro"
        );
    }

    #[test]
    fn test_stage_rejects_invalid_site() {
        assert!(HtmlPayloadStage::new("not a url", Duration::from_secs(1)).is_err());
        assert!(PageReportStage::new("mailto:me@example.com", Duration::from_secs(1)).is_err());
        assert!(PageReportStage::new("http://localhost:3000", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_score_is_linear_between_thresholds() {
        assert!((timing(500.0).score() - 1.0).abs() < f64::EPSILON);
        assert!((timing(5_500.0).score() - 0.5).abs() < f64::EPSILON);
        assert!(timing(20_000.0).score().abs() < f64::EPSILON);
    }

    #[test]
    fn test_timing_deserializes_from_script_shape() {
        let value = serde_json::json!({
            "ttfb": 12.5,
            "domContentLoaded": 300.0,
            "load": 450.0,
            "transferSize": 1024
        });
        let timing: PageTiming = serde_json::from_value(value).unwrap();
        assert!((timing.load - 450.0).abs() < f64::EPSILON);
        assert!((timing.transfer_size - 1024.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rendered_html_is_escaped() {
        let report = PageReport {
            path: "/search?q=<script>",
            url: "https://example.com/search?q=<script>",
            score: 0.75,
            timing: timing(1_200.0),
        };
        let html = render_html(&report);
        assert!(html.contains("/search?q=&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Score: 0.75"));
    }

    #[tokio::test]
    async fn test_write_artifact_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("abc").join("lighthouse.json");
        write_artifact(&path, b"{}").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }
}
