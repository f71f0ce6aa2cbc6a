//! The `scan` command.

use crate::routes;
use anyhow::{Context, Result};
use clap::Args;
use lantern_browser::{BrowserEngine, HtmlPayloadStage, PageReportStage};
use lantern_core::{AppConfig, CustomSampling, TaskReport, TaskStatus};
use lantern_scanner::{
    Cluster, Pipeline, RouteScheduler, ScanStatus, SchedulerConfig, TaskEvent, TaskEventKind,
    WorkerPool, WorkerStats,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Base URL of the site, overrides the config file
    #[arg(long)]
    pub site: Option<String>,
    /// TOML file listing the routes to scan
    #[arg(long)]
    pub routes: PathBuf,
    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory for report artifacts, overrides the config file
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Seconds between progress lines
    #[arg(long, default_value = "2")]
    pub interval: u64,
    /// Print the final reports as JSON
    #[arg(long)]
    pub json: bool,
}

fn load_config(args: &ScanArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    config.apply_env();
    if let Some(site) = &args.site {
        config.site.clone_from(site);
    }
    if let Some(output) = &args.output {
        config.output_path.clone_from(output);
    }
    config.validate()?;
    Ok(config)
}

pub async fn run(args: ScanArgs) -> Result<()> {
    let config = load_config(&args)?;
    let sampling = CustomSampling::from_config(&config.scanner.custom_sampling)?;
    let routes = routes::load(&args.routes, &sampling)?;
    info!(site = %config.site, routes = routes.len(), "starting scan");

    let timeout = config.browser.navigation_timeout();
    let pipeline = Pipeline::new()
        .stage(
            HtmlPayloadStage::NAME,
            HtmlPayloadStage::new(&config.site, timeout)?,
        )
        .stage(
            PageReportStage::NAME,
            PageReportStage::new(&config.site, timeout)?,
        );

    let engine = BrowserEngine::launch(&config.browser)
        .await
        .context("failed to launch browser")?;
    let pool = Arc::new(Cluster::new(engine, config.scanner.max_workers));
    let scheduler = RouteScheduler::new(Arc::clone(&pool), pipeline, SchedulerConfig::from(&config));

    let events = tokio::spawn(log_events(scheduler.subscribe()));
    let queued = scheduler.queue_routes(routes);
    let stats = wait_for_completion(&scheduler, Duration::from_secs(args.interval.max(1))).await;

    events.abort();
    pool.close().await;

    let reports = scheduler.reports();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
    }
    info!(
        queued,
        failed = reports.iter().filter(|r| r.has_failed()).count(),
        time_running = stats.time_running,
        "scan finished"
    );
    Ok(())
}

async fn wait_for_completion<P: WorkerPool>(
    scheduler: &RouteScheduler<P>,
    interval: Duration,
) -> WorkerStats {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping scan");
                return scheduler.monitor();
            }
        }

        let stats = scheduler.monitor();
        info!(
            done = stats.done_targets,
            all = stats.all_targets,
            percent = %stats.done_perc_str,
            errors = %stats.error_perc,
            pages_per_second = %stats.pages_per_second,
            cpu = %stats.cpu_usage,
            memory = %stats.memory_usage,
            workers = stats.workers,
            "scan progress"
        );
        if stats.status == ScanStatus::Completed && scheduler.running_tasks() == 0 {
            return stats;
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<TaskEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match event.kind() {
                TaskEventKind::TaskComplete => {
                    info!(route = %event.path(), stage = event.stage(), "task complete");
                }
                kind => debug!(route = %event.path(), stage = event.stage(), event = %kind),
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_summary(reports: &[TaskReport]) {
    println!("{:<48} {:>6}  STATUS", "ROUTE", "SCORE");
    for report in reports {
        let score = report
            .score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
        println!(
            "{:<48} {:>6}  {}",
            report.route().path(),
            score,
            summary_status(report)
        );
    }
}

fn summary_status(report: &TaskReport) -> String {
    report
        .tasks
        .iter()
        .find(|(_, status)| **status != TaskStatus::Completed)
        .map_or_else(
            || TaskStatus::Completed.to_string(),
            |(stage, status)| format!("{stage}: {status}"),
        )
}
