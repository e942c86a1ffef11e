//! Listings crawler CLI
//!
//! Reads a crawl input document, enumerates the matching listings and writes
//! them as JSON lines. Interrupted runs resume from the saved state file
//! unless `--fresh` is given.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use listings_crawler::config::Config;
use listings_crawler::fetchers::{http::DEFAULT_USER_AGENT, FetcherExt};
use listings_crawler::{
    ApiEndpoints, CrawlInput, FileStateStore, HttpFetcher, JsonlSink, Orchestrator,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "listings-crawler")]
#[command(about = "Enumerate marketplace listings past the search result cap")]
struct Cli {
    /// Crawl input document (JSON)
    #[arg(long, default_value = "INPUT.json")]
    input: PathBuf,

    /// Directory receiving dataset.jsonl and the key-value store
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Run state file (defaults to <output>/state.json)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Ignore any saved run state and start over
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input {}", cli.input.display()))?;
    let input: CrawlInput = serde_json::from_str(&raw).context("Failed to parse input")?;

    // Initialize logging
    let default_filter = if input.debug_log {
        "info,listings_crawler=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    input.validate().context("Invalid input")?;
    let config = Config::from_env()?;

    tracing::info!(
        location = ?input.location_query,
        min_price = input.min_price,
        max_price = input.max_price,
        start_urls = input.start_urls.len(),
        "Starting listings crawler"
    );

    let proxies = input.proxy_urls()?;
    let fetcher = HttpFetcher::with_proxies(DEFAULT_USER_AGENT, &proxies)
        .context("Failed to build HTTP client")?
        .rate_limited(config.requests_per_second);

    let mut endpoints = ApiEndpoints::new(config.api_base_url.clone(), config.api_key.clone())
        .context("Invalid AIRBNB_API_BASE_URL")?;
    if let Some(currency) = &input.currency {
        endpoints = endpoints.with_currency(currency.clone());
    }

    let sink = Arc::new(
        JsonlSink::open(&cli.output)
            .await
            .with_context(|| format!("Failed to open output {}", cli.output.display()))?,
    );

    let state_path = cli
        .state
        .clone()
        .unwrap_or_else(|| cli.output.join("state.json"));
    let state_store = Arc::new(FileStateStore::new(state_path));
    if cli.fresh {
        state_store
            .clear()
            .await
            .context("Failed to clear saved run state")?;
    }

    let mut orchestrator = Orchestrator::new(
        fetcher,
        endpoints,
        sink,
        input.to_enumeration_config(),
        input.to_detail_options()?,
    )
    .with_state_store(state_store);

    let resumed = orchestrator
        .resume()
        .await
        .context("Failed to load saved run state")?;
    if !resumed {
        orchestrator
            .seed(input.seed_units()?)
            .await
            .context("Failed to seed work queue")?;
    }

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            shutdown.cancel();
        }
    });

    let summary = Arc::new(orchestrator)
        .run()
        .await
        .context("Enumeration failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
