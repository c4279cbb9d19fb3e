//! Wattboard REST API
//!
//! HTTP API layer, built with Axum. Every endpoint reads the local energy
//! store; the collector keeps it filled.
//!
//! # Endpoints
//!
//! ## Homes
//! - `GET /api/homes` - List homes
//! - `GET /api/homes/:home_id` - Home details
//!
//! ## Charts
//! - `GET /api/price/:home_id` - `{times, prices, currency}`
//! - `GET /api/consumption/:home_id` - `{dates, consumption, cost, currency}`
//! - `GET /api/production/:home_id` - `{dates, production, profit}`
//! - `GET /api/measurements/:home_id` - Stored live samples
//!
//! ## Server-sent events
//! - `GET /api/live-data/:home_id` - Live measurements
//! - `GET /events/price/:home_id` - Price refreshes
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use wattboard::api::{serve, shutdown_signal, AppState};
//! use wattboard::config::ApiConfig;
//! use wattboard::storage::EnergyStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(EnergyStore::open("energy.db")?);
//!     let state = AppState::new(store, ApiConfig::default());
//!     serve(state, shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::live::{live_data_stream, price_stream};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/homes", get(routes::homes::list_homes))
        .route("/homes/:home_id", get(routes::homes::get_home))
        .route("/price/:home_id", get(routes::energy::price_chart))
        .route("/consumption/:home_id", get(routes::energy::consumption_chart))
        .route("/production/:home_id", get(routes::energy::production_chart))
        .route("/measurements/:home_id", get(routes::measurements::list_measurements))
        .route("/live-data/:home_id", get(live_data_stream));

    let event_routes = Router::new().route("/price/:home_id", get(price_stream));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    Router::new()
        .nest("/api", api_routes)
        .nest("/events", event_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.addr();
    let listener = TcpListener::bind(&addr).await?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let title = state.config.title.clone();
    let streams = state.shutdown.clone();
    let router = build_router(state);
    let shutdown = async move {
        shutdown.await;
        streams.cancel();
    };

    tracing::info!(addr = %listener.local_addr()?, title = %title, "API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("API shut down gracefully");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
