//! Live Feed Client
//!
//! Consumes the server's live-data stream for a home and keeps a shared,
//! per-home list of records from which chart data is built.
//!
//! ## Architecture
//!
//! - **SseDecoder**: Incremental `text/event-stream` parser
//! - **MeasurementStore**: Records per home in arrival order
//! - **LiveFeed**: One connection task per feed; closes on error, `close()`,
//!   drop, or home switch
//! - **ChartView / CurrentValues**: Series and display lines for the latest data
//!
//! ## Example
//!
//! ```rust,ignore
//! use wattboard::feed::{ChartView, FeedConfig, LiveFeed, MeasurementStore};
//!
//! let store = MeasurementStore::new();
//! let feed = LiveFeed::connect(FeedConfig::new("http://localhost:8080"), "home-1", store.clone())?;
//! let chart = ChartView::from_measurements(&store.measurements("home-1").await);
//! ```

mod chart;
mod client;
mod sse;
mod store;

pub use chart::{ChartView, CurrentValues, Dataset, CONSUMPTION_LABEL, PRODUCTION_LABEL};
pub use client::{FeedConfig, FeedState, LiveFeed, ReconnectPolicy, CLOSED_BY_CLIENT};
pub use sse::{SseDecoder, SseEvent, DEFAULT_EVENT};
pub use store::MeasurementStore;

use thiserror::Error;

/// Errors that end a feed connection
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server responded with HTTP {0}")]
    Status(u16),

    #[error("Stream ended by server")]
    StreamEnded,
}
