//! Tibber API Integration
//!
//! - **client**: GraphQL over HTTP with bearer auth and retry
//! - **queries**: GraphQL documents
//! - **services**: Typed home, energy and price operations
//! - **live**: `graphql-transport-ws` subscription for live measurements
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wattboard::config::TibberConfig;
//! use wattboard::tibber::{PriceService, TibberClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TibberConfig {
//!         token: std::env::var("TIBBER_API_TOKEN")?,
//!         ..Default::default()
//!     };
//!     let client = Arc::new(TibberClient::new(config)?);
//!
//!     let prices = PriceService::new(client).prices("home-id").await?;
//!     println!("current price: {}", prices.current.total);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod live;
pub mod queries;
pub mod services;

pub use client::TibberClient;
pub use live::{LiveEvent, LiveSubscription, MeasurementSource, ProtocolMessage};
pub use services::{EnergyService, HomeService, PriceService};

use thiserror::Error;

/// Errors that can occur when talking to Tibber
#[derive(Error, Debug)]
pub enum TibberError {
    #[error("No Tibber API token configured")]
    NoToken,

    #[error("Tibber API unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Response contained no data")]
    MissingData,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("Home not found: {0}")]
    HomeNotFound(String),

    #[error("Real-time consumption is not enabled for home {0}")]
    RealtimeDisabled(String),

    #[error("No current price for home {0}")]
    NoCurrentPrice(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}
