//! Wattboard server
//!
//! Serves the REST and SSE API and, when a Tibber token is configured, runs
//! the collector in the same process so live measurements reach dashboards
//! without a round trip through the database.
//!
//! Run with: cargo run --bin wattboard -- --config config.toml
//!
//! Environment variables override the config file, see
//! `wattboard-cli config` for the full list.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use wattboard::api::{serve, shutdown_signal, AppState};
use wattboard::collector::Collector;
use wattboard::config::Config;
use wattboard::live::{HubConfig, LiveHub};
use wattboard::storage::EnergyStore;
use wattboard::tibber::{LiveSubscription, MeasurementSource, TibberClient};

#[derive(Parser)]
#[command(name = "wattboard", version = env!("CARGO_PKG_VERSION"), about = "Home energy dashboard server")]
struct Args {
    /// Config file (defaults to the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve stored data only, without collecting from Tibber
    #[arg(long)]
    no_collector: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load_from(args.config.as_deref()).context("loading configuration")?;
    let _guard = wattboard::logging::init(&config.logging);

    tracing::info!("Starting Wattboard v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {}", config.storage.database);

    let store = Arc::new(
        EnergyStore::open(&config.storage.database)
            .with_context(|| format!("opening database {}", config.storage.database))?,
    );
    let hub = Arc::new(LiveHub::new(HubConfig {
        max_connections: config.api.max_live_connections,
        ..Default::default()
    }));

    let cancel = CancellationToken::new();
    let mut state = AppState::with_hub(Arc::clone(&store), Arc::clone(&hub), config.api.clone())
        .with_shutdown(cancel.clone());
    let mut handles = Vec::new();

    if args.no_collector {
        tracing::info!("Collector disabled by flag");
    } else if !config.tibber.has_token() {
        tracing::warn!("No Tibber token configured (set TIBBER_API_TOKEN); serving stored data only");
    } else {
        let client = Arc::new(TibberClient::new(config.tibber.clone())?);
        let collector = Arc::new(Collector::new(
            client,
            Arc::clone(&store),
            Arc::clone(&hub),
            config.collector.clone(),
        ));
        state = state.with_status(collector.status());

        let source: Arc<dyn MeasurementSource> = Arc::new(LiveSubscription::from_config(&config.tibber));
        handles = collector
            .start(Some(source), config.tibber.home_id.as_deref(), cancel.clone())
            .await;
        tracing::info!(tasks = handles.len(), "Collector started");
    }

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown requested");
            cancel.cancel();
        }
    };
    let result = serve(state, shutdown).await;

    // The server can also stop on a bind or accept error
    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    result?;
    tracing::info!("Wattboard stopped");
    Ok(())
}
