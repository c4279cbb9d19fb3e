//! Wattboard collector
//!
//! Runs price, energy, retention and live-ingest tasks without the HTTP
//! server. Use this when the API runs elsewhere against the same database.
//!
//! Run with: cargo run --bin wattboard-collector

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use wattboard::api::shutdown_signal;
use wattboard::collector::Collector;
use wattboard::config::Config;
use wattboard::live::{HubConfig, LiveHub};
use wattboard::storage::EnergyStore;
use wattboard::tibber::{LiveSubscription, MeasurementSource, TibberClient};

#[derive(Parser)]
#[command(name = "wattboard-collector", version = env!("CARGO_PKG_VERSION"), about = "Collect Tibber data into the Wattboard database")]
struct Args {
    /// Config file (defaults to the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collect prices and energy once, then exit
    #[arg(long)]
    once: bool,

    /// Skip the real-time subscription
    #[arg(long)]
    no_live: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load_from(args.config.as_deref()).context("loading configuration")?;
    let _guard = wattboard::logging::init(&config.logging);

    if !config.tibber.has_token() {
        bail!("No Tibber token configured (set TIBBER_API_TOKEN)");
    }

    let store = Arc::new(
        EnergyStore::open(&config.storage.database)
            .with_context(|| format!("opening database {}", config.storage.database))?,
    );
    // Nobody subscribes in this process; the hub only tracks latest values
    let hub = Arc::new(LiveHub::new(HubConfig::default()));
    let client = Arc::new(TibberClient::new(config.tibber.clone())?);
    let collector = Arc::new(Collector::new(client, store, hub, config.collector.clone()));
    let cancel = CancellationToken::new();

    if args.once {
        let homes = collector.refresh_homes().await?;
        tracing::info!(homes = homes.len(), "Homes refreshed");
        let prices = collector.collect_prices_once(&cancel).await?;
        let energy = collector.collect_energy_once(&cancel).await?;
        tracing::info!(prices, energy, "One-shot collection finished");
        return Ok(());
    }

    let source: Option<Arc<dyn MeasurementSource>> = if args.no_live {
        None
    } else {
        Some(Arc::new(LiveSubscription::from_config(&config.tibber)))
    };

    tracing::info!("Starting Wattboard collector v{}", env!("CARGO_PKG_VERSION"));
    let status = collector.status();
    let handles = Arc::clone(&collector)
        .start(source, config.tibber.home_id.as_deref(), cancel.clone())
        .await;

    shutdown_signal().await;
    tracing::info!("Shutdown requested");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    for (task, task_status) in status.snapshot().await {
        tracing::info!(task = %task, runs = task_status.runs, failures = task_status.failures, "Task summary");
    }
    Ok(())
}
