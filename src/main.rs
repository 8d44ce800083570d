//! Trawl main entry point
//!
//! Command-line interface for the file-harvesting crawler.

use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use trawl::config::{load_config_with_hash, Config};
use trawl::crawler::Coordinator;

/// Trawl: crawl websites and download the files they link to
///
/// Discovers downloadable-file links on the given seed pages up to a
/// configurable depth, classifies them by type, and downloads them
/// concurrently. Anonymity-network hosts can be routed through a SOCKS
/// proxy.
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version)]
#[command(about = "Crawl websites and download the files they link to", long_about = None)]
struct Cli {
    /// Seed URLs to crawl (appended to any seeds from the config file)
    #[arg(value_name = "URL")]
    seeds: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Download directory (overrides config)
    #[arg(short, long, value_name = "DIR")]
    output: Option<String>,

    /// Crawl depth (overrides config)
    #[arg(short, long, value_name = "N")]
    depth: Option<u32>,

    /// Maximum concurrent downloads (overrides config)
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Per-request timeout in seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Delay between request waves in seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    delay: Option<f64>,

    /// Only discover and classify file links, don't download
    #[arg(long)]
    find_only: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;

    // A single Ctrl-C cancels the whole run; in-flight work winds down
    // and a partial report is still produced
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let coordinator = Coordinator::new(config, cancel)?;

    if cli.find_only {
        let found = coordinator.discover().await?;
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        let report = coordinator.run().await?;
        let failed = report.stats.downloads_failed;
        if failed > 0 {
            tracing::warn!("{} downloads failed; see the metadata artifact for details", failed);
        }
    }

    Ok(())
}

/// Builds the effective configuration from file and CLI overrides
fn build_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)?;
            tracing::info!("Configuration loaded (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    config.seeds.extend(cli.seeds.iter().cloned());

    if let Some(output) = &cli.output {
        config.output.download_dir = output.clone();
    }
    if let Some(depth) = cli.depth {
        config.crawler.max_crawl_depth = depth;
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.crawler.max_concurrent_downloads = max_concurrent;
    }
    if let Some(timeout) = cli.timeout {
        config.crawler.request_timeout_secs = timeout;
    }
    if let Some(delay) = cli.delay {
        config.crawler.delay_between_requests_secs = delay;
    }

    // CLI overrides re-run validation so bad flags fail like bad config
    trawl::config::validate(&config)?;

    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawl=info,warn"),
            1 => EnvFilter::new("trawl=debug,info"),
            2 => EnvFilter::new("trawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
