//! Lantern command-line interface.

mod routes;
mod scan;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "lantern", version, about = "Scan every route of a site in a headless browser")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue the routes of a site and run the page stages on each
    Scan(scan::ScanArgs),
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lantern=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    info!("Starting Lantern v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Scan(args) => scan::run(args).await,
    }
}
