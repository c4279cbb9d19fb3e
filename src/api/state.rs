//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::collector::StatusBoard;
use crate::config::ApiConfig;
use crate::live::{HubConfig, LiveHub};
use crate::storage::EnergyStore;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Energy store filled by the collector
    pub store: Arc<EnergyStore>,
    /// Live measurement fan-out
    pub hub: Arc<LiveHub>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Collector task status, when a collector runs in this process
    pub status: Option<Arc<StatusBoard>>,
    /// Cancelled when the server shuts down; ends open event streams
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State with its own hub sized from the config
    pub fn new(store: Arc<EnergyStore>, config: ApiConfig) -> Self {
        let hub = LiveHub::new(HubConfig {
            max_connections: config.max_live_connections,
            ..Default::default()
        });
        Self::with_hub(store, Arc::new(hub), config)
    }

    /// State sharing a hub with a collector
    pub fn with_hub(store: Arc<EnergyStore>, hub: Arc<LiveHub>, config: ApiConfig) -> Self {
        Self {
            store,
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
            status: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_status(mut self, status: Arc<StatusBoard>) -> Self {
        self.status = Some(status);
        self
    }

    /// Share a shutdown token with other tasks of the process
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
