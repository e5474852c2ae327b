//! cdp-crawler: discover a CDP topology and print it as JSON

use std::path::PathBuf;

use anyhow::Context;
use cdp_crawler::{CrawlConfig, Crawler};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "cdp-crawler")]
#[command(author, version, about = "Breadth-first CDP topology discovery", long_about = None)]
struct Cli {
    /// Path to the JSON crawl configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print the snapshot on a single line
    #[arg(long)]
    compact: bool,
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = CrawlConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let crawler = Crawler::from_config(&config).context("invalid crawl configuration")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping crawl");
            let _ = cancel_tx.send(true);
        } else {
            warn!("could not listen for Ctrl-C");
        }
    });

    let graph = crawler.crawl_with_cancel(cancel_rx).await;
    let snapshot = graph.snapshot();
    let json = if cli.compact {
        serde_json::to_string(&snapshot)
    } else {
        serde_json::to_string_pretty(&snapshot)
    }
    .context("failed to serialize topology")?;
    println!("{json}");
    Ok(())
}
