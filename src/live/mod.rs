//! Live Data Streaming
//!
//! Pushes live power measurements to dashboards over server-sent events.
//!
//! ## Architecture
//!
//! - **LiveHub**: Per-home broadcast channels with a global connection limit
//! - **Handler**: SSE endpoints for live measurements and price refreshes
//!
//! ## Wire format
//!
//! ```text
//! event: ready
//! data: {"connectionId":"…","homeId":"home-1"}
//!
//! data: {"timestamp":"2024-03-02T12:00:00Z","power":1234.5,"powerProduction":0.0,
//!        "accumulatedConsumption":3.2,"accumulatedProduction":0.0}
//!
//! : keep-alive
//! ```
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const source = new EventSource('/api/live-data/home-1');
//! source.onmessage = (event) => console.log(JSON.parse(event.data));
//! ```

mod handler;
mod hub;

pub use handler::{live_data_stream, price_stream, PRICE_EVENT, READY_EVENT};
pub use hub::{ConnectionId, HubConfig, HubError, LiveHub, LiveSubscriber, PriceSubscriber};
