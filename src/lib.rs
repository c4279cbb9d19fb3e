//! # Wattboard
//!
//! Home energy dashboard backend. Collects consumption, production, prices
//! and live power measurements from Tibber, keeps them in SQLite, and serves
//! them to dashboards over REST and server-sent events.
//!
//! ## Modules
//!
//! - [`tibber`]: GraphQL client, typed services and the real-time subscription
//! - [`storage`]: SQLite energy store
//! - [`collector`]: Scheduled collection and live ingest
//! - [`api`]: REST and SSE server with Axum
//! - [`live`]: Per-home live measurement fan-out
//! - [`feed`]: Client for the live stream, with chart views
//! - [`display`]: Formatting helpers for homes, prices and times
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wattboard::api::{serve, shutdown_signal, AppState};
//! use wattboard::config::Config;
//! use wattboard::storage::EnergyStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let store = Arc::new(EnergyStore::open(&config.storage.database)?);
//!
//!     let state = AppState::new(store, config.api.clone());
//!     serve(state, shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod display;
pub mod feed;
pub mod live;
pub mod logging;
pub mod model;
pub mod storage;
pub mod tibber;

pub use config::Config;
pub use model::{Consumption, Home, LiveData, Measurement, Price, PriceInfo, PriceLevel, Production};
