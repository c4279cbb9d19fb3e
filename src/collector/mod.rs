//! Background Collection
//!
//! Keeps the local store in step with Tibber:
//!
//! - **Prices**: immediately, then every `price_interval_mins`
//! - **Energy**: immediately, then nightly at `energy_refresh_hour` local time
//! - **Retention**: hourly removal of live measurements past `retention_hours`
//! - **Live ingest**: one subscription per real-time enabled home
//!
//! Every task records its outcome on a shared [`StatusBoard`] and stops
//! when the collector's cancellation token fires.

mod ingest;
mod schedule;
mod status;

pub use ingest::{task_name as live_task_name, LiveIngest};
pub use schedule::{next_daily_run, until};
pub use status::{StatusBoard, TaskStatus};

use chrono::{Duration as ChronoDuration, Local, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CollectorConfig;
use crate::live::LiveHub;
use crate::model::{Home, Resolution};
use crate::storage::{EnergyStore, StorageError};
use crate::tibber::{
    EnergyService, HomeService, MeasurementSource, PriceService, TibberClient, TibberError,
};

pub const PRICES_TASK: &str = "prices";
pub const ENERGY_TASK: &str = "energy";
pub const RETENTION_TASK: &str = "retention";

const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

/// Errors from a collection pass
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Tibber error: {0}")]
    Tibber(#[from] TibberError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No homes available")]
    NoHomes,

    #[error("Cancelled")]
    Cancelled,
}

/// Periodic Tibber collection into the local store
pub struct Collector {
    homes: HomeService,
    energy: EnergyService,
    prices: PriceService,
    store: Arc<EnergyStore>,
    hub: Arc<LiveHub>,
    status: Arc<StatusBoard>,
    config: CollectorConfig,
    known_homes: RwLock<Vec<Home>>,
}

impl Collector {
    pub fn new(
        client: Arc<TibberClient>,
        store: Arc<EnergyStore>,
        hub: Arc<LiveHub>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            homes: HomeService::new(Arc::clone(&client)),
            energy: EnergyService::new(Arc::clone(&client)),
            prices: PriceService::new(client),
            store,
            hub,
            status: Arc::new(StatusBoard::new()),
            config,
            known_homes: RwLock::new(Vec::new()),
        }
    }

    pub fn status(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.status)
    }

    pub async fn homes(&self) -> Vec<Home> {
        self.known_homes.read().await.clone()
    }

    /// Reload homes from Tibber and persist them.
    ///
    /// Falls back to the stored homes when Tibber cannot be reached.
    pub async fn refresh_homes(&self) -> Result<Vec<Home>, CollectorError> {
        let homes = match self.homes.home_details().await {
            Ok(homes) => {
                let written = self.store.upsert_homes(&homes)?;
                tracing::info!(homes = written, "Refreshed homes");
                homes
            }
            Err(e) => {
                let stored = self.store.homes()?;
                if stored.is_empty() {
                    return Err(e.into());
                }
                tracing::warn!(error = %e, stored = stored.len(), "Using stored homes");
                stored
            }
        };

        *self.known_homes.write().await = homes.clone();
        Ok(homes)
    }

    async fn homes_or_refresh(&self) -> Result<Vec<Home>, CollectorError> {
        let homes = self.homes().await;
        if !homes.is_empty() {
            return Ok(homes);
        }
        let homes = self.refresh_homes().await?;
        if homes.is_empty() {
            return Err(CollectorError::NoHomes);
        }
        Ok(homes)
    }

    /// Wait between homes; `false` if cancelled meanwhile
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        let pause = Duration::from_millis(self.config.home_pause_ms);
        if pause.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(pause) => true,
        }
    }

    /// Fetch and store prices for every home, then notify price streams.
    ///
    /// Returns the number of homes updated. Fails only when no home could
    /// be updated.
    pub async fn collect_prices_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<usize, CollectorError> {
        let homes = self.homes_or_refresh().await?;
        let mut updated = 0;
        let mut last_error = None;

        for (i, home) in homes.iter().enumerate() {
            if i > 0 && !self.pause(cancel).await {
                return Err(CollectorError::Cancelled);
            }

            match self.collect_home_prices(&home.id).await {
                Ok(new_rows) => {
                    tracing::debug!(home_id = %home.id, new_rows, "Stored prices");
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!(home_id = %home.id, error = %e, "Price collection failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if updated == 0 => Err(e),
            _ => Ok(updated),
        }
    }

    async fn collect_home_prices(&self, home_id: &str) -> Result<usize, CollectorError> {
        let info = self.prices.prices(home_id).await?;
        let new_rows = self.store.store_prices(home_id, &info)?;
        self.hub.notify_prices(home_id).await;
        Ok(new_rows)
    }

    /// Fetch recent daily consumption, and production where the home has it.
    pub async fn collect_energy_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<usize, CollectorError> {
        let homes = self.homes_or_refresh().await?;
        let mut updated = 0;
        let mut last_error = None;

        for (i, home) in homes.iter().enumerate() {
            if i > 0 && !self.pause(cancel).await {
                return Err(CollectorError::Cancelled);
            }

            match self.collect_home_energy(home).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    tracing::warn!(home_id = %home.id, error = %e, "Energy collection failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if updated == 0 => Err(e),
            _ => Ok(updated),
        }
    }

    async fn collect_home_energy(&self, home: &Home) -> Result<(), CollectorError> {
        let days = self.config.energy_days;

        let consumption = self
            .energy
            .consumption(&home.id, Resolution::Daily, days)
            .await?;
        let rows = self.store.store_consumption(&home.id, &consumption)?;
        tracing::debug!(home_id = %home.id, rows, "Stored consumption");

        if home.has_production() {
            let production = self
                .energy
                .production(&home.id, Resolution::Daily, days)
                .await?;
            let rows = self.store.store_production(&home.id, &production)?;
            tracing::debug!(home_id = %home.id, rows, "Stored production");
        }

        Ok(())
    }

    /// Delete live measurements older than the retention window
    pub fn apply_retention(&self) -> Result<usize, CollectorError> {
        let window = i64::try_from(self.config.retention_hours)
            .ok()
            .and_then(ChronoDuration::try_hours);
        let cutoff = match window.and_then(|w| Utc::now().checked_sub_signed(w)) {
            Some(cutoff) => cutoff,
            None => return Ok(0),
        };
        Ok(self.store.cleanup_measurements(cutoff)?)
    }

    async fn record<T>(&self, task: &str, result: Result<T, CollectorError>) {
        match result {
            Ok(_) => self.status.record_success(task).await,
            Err(CollectorError::Cancelled) => {}
            Err(e) => {
                tracing::error!(task, error = %e, "Collection failed");
                self.status.record_failure(task, e).await;
            }
        }
    }

    /// Price loop. The first tick fires immediately.
    pub async fn run_price_collection(self: Arc<Self>, cancel: CancellationToken) {
        let period = Duration::from_secs(self.config.price_interval_mins.max(1) * 60);
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = self.collect_prices_once(&cancel).await;
            self.record(PRICES_TASK, result).await;
        }
    }

    /// Energy loop: once now, then nightly
    pub async fn run_energy_collection(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let result = self.collect_energy_once(&cancel).await;
            self.record(ENERGY_TASK, result).await;

            let now = Local::now();
            let next = next_daily_run(&now, self.config.energy_refresh_hour);
            tracing::info!(next = %next, "Next energy refresh scheduled");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(until(&now, &next)) => {}
            }
        }
    }

    /// Retention loop: hourly
    pub async fn run_retention(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(RETENTION_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = self.apply_retention();
            if let Ok(removed) = &result {
                if *removed > 0 {
                    tracing::info!(removed, "Removed expired measurements");
                }
            }
            self.record(RETENTION_TASK, result).await;
        }
    }

    /// Homes that get a live subscription: the configured one if set,
    /// otherwise every home with real-time consumption enabled.
    pub async fn live_homes(&self, configured: Option<&str>) -> Vec<String> {
        match configured {
            Some(id) => vec![id.to_string()],
            None => self
                .homes()
                .await
                .into_iter()
                .filter(Home::realtime_enabled)
                .map(|h| h.id)
                .collect(),
        }
    }

    /// Spawn every background task. Handles finish after `cancel` fires.
    pub async fn start(
        self: Arc<Self>,
        source: Option<Arc<dyn MeasurementSource>>,
        live_home: Option<&str>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        if let Err(e) = self.refresh_homes().await {
            tracing::error!(error = %e, "Initial home refresh failed");
        }

        let mut handles = vec![
            tokio::spawn(Arc::clone(&self).run_price_collection(cancel.clone())),
            tokio::spawn(Arc::clone(&self).run_energy_collection(cancel.clone())),
            tokio::spawn(Arc::clone(&self).run_retention(cancel.clone())),
        ];

        if let Some(source) = source {
            let ingest = LiveIngest::new(
                Arc::clone(&self.store),
                Arc::clone(&self.hub),
                Arc::clone(&self.status),
                Duration::from_secs(self.config.reconnect_delay_secs),
            );
            for home_id in self.live_homes(live_home).await {
                tracing::info!(home_id = %home_id, "Starting live ingest");
                let ingest = ingest.clone();
                let source = Arc::clone(&source);
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    ingest.run(source, home_id, cancel).await
                }));
            }
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::HubConfig;
    use crate::model::Measurement;
    use crate::tibber::client::tests::{serve_graphql, test_config};
    use serde_json::json;

    /// One response shaped to satisfy the homes, prices and energy queries
    fn account_response() -> serde_json::Value {
        let price_info = json!({
            "current": {"total": 0.31, "startsAt": "2024-03-02T10:00:00.000+01:00", "currency": "EUR", "level": "NORMAL"},
            "today": [
                {"total": 0.31, "startsAt": "2024-03-02T10:00:00.000+01:00", "currency": "EUR"},
                {"total": 0.22, "startsAt": "2024-03-02T11:00:00.000+01:00", "currency": "EUR"}
            ],
            "tomorrow": []
        });
        json!({"data": {"viewer": {
            "homes": [
                {
                    "id": "home-1",
                    "appNickname": "Huis",
                    "meteringPointData": {"consumptionEan": "871", "productionEan": "872"},
                    "features": {"realTimeConsumptionEnabled": true},
                    "currentSubscription": {"priceInfo": price_info.clone()}
                },
                {
                    "id": "home-2",
                    "appNickname": "Flat",
                    "meteringPointData": {"consumptionEan": "873"},
                    "features": {"realTimeConsumptionEnabled": false},
                    "currentSubscription": {"priceInfo": price_info}
                }
            ],
            "home": {
                "consumption": {"nodes": [
                    {"from": "2024-03-01T00:00:00.000+01:00", "to": "2024-03-02T00:00:00.000+01:00",
                     "cost": 2.1, "consumption": 7.0, "currency": "EUR"}
                ]},
                "production": {"nodes": [
                    {"from": "2024-03-01T00:00:00.000+01:00", "to": "2024-03-02T00:00:00.000+01:00",
                     "profit": 0.4, "production": 3.5, "currency": "EUR"}
                ]}
            }
        }}})
    }

    fn quick_config() -> CollectorConfig {
        CollectorConfig {
            home_pause_ms: 0,
            reconnect_delay_secs: 0,
            ..Default::default()
        }
    }

    async fn collector(response: serde_json::Value) -> (Arc<Collector>, Arc<EnergyStore>, Arc<LiveHub>) {
        let url = serve_graphql(response).await;
        let client = Arc::new(TibberClient::new(test_config(url)).unwrap());
        let store = Arc::new(EnergyStore::open_in_memory().unwrap());
        let hub = Arc::new(LiveHub::new(HubConfig::default()));
        let collector = Collector::new(client, store.clone(), hub.clone(), quick_config());
        (Arc::new(collector), store, hub)
    }

    #[tokio::test]
    async fn test_refresh_homes_persists() {
        let (collector, store, _) = collector(account_response()).await;

        let homes = collector.refresh_homes().await.unwrap();
        assert_eq!(homes.len(), 2);
        assert_eq!(store.homes().unwrap().len(), 2);
        assert_eq!(collector.live_homes(None).await, vec!["home-1"]);
        assert_eq!(collector.live_homes(Some("home-2")).await, vec!["home-2"]);
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_stored_homes() {
        let (collector, store, _) =
            collector(json!({"errors": [{"message": "down for maintenance"}]})).await;

        assert!(matches!(
            collector.refresh_homes().await,
            Err(CollectorError::Tibber(TibberError::GraphQl(_)))
        ));

        store.upsert_homes(&[Home::new("home-9")]).unwrap();
        let homes = collector.refresh_homes().await.unwrap();
        assert_eq!(homes[0].id, "home-9");
    }

    #[tokio::test]
    async fn test_collect_prices_notifies_streams() {
        let (collector, store, hub) = collector(account_response()).await;
        let notifications = hub.subscribe_prices("home-1").await.unwrap();

        let updated = collector
            .collect_prices_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let info = store.price_info("home-1").unwrap().unwrap();
        assert_eq!(info.today.len(), 2);

        use futures_util::StreamExt;
        let mut stream = Box::pin(notifications.into_stream());
        assert_eq!(stream.next().await, Some(()));
    }

    #[tokio::test]
    async fn test_collect_energy_respects_production() {
        let (collector, store, _) = collector(account_response()).await;

        let updated = collector
            .collect_energy_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(updated, 2);

        assert_eq!(store.consumption("home-1", 10).unwrap().len(), 1);
        assert_eq!(store.consumption("home-2", 10).unwrap().len(), 1);
        assert_eq!(store.production("home-1", 10).unwrap().len(), 1);
        assert!(store.production("home-2", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_removes_old_measurements() {
        let (collector, store, _) = collector(account_response()).await;

        let old = Measurement {
            timestamp: Some(Utc::now() - ChronoDuration::hours(48)),
            power: 1.0,
            ..Default::default()
        };
        let fresh = Measurement {
            timestamp: Some(Utc::now()),
            power: 2.0,
            ..Default::default()
        };
        store.store_measurement("home-1", &old).unwrap();
        store.store_measurement("home-1", &fresh).unwrap();

        assert_eq!(collector.apply_retention().unwrap(), 1);
        assert_eq!(store.latest_measurements("home-1", 10).unwrap()[0].power, 2.0);
    }

    #[tokio::test]
    async fn test_price_loop_records_status_and_stops() {
        let (collector, _, _) = collector(account_response()).await;
        let status = collector.status();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&collector).run_price_collection(cancel.clone()));
        while status.get(PRICES_TASK).await.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let task = status.get(PRICES_TASK).await.unwrap();
        assert_eq!(task.failures, 0);
        assert!(task.is_healthy());
    }

    #[tokio::test]
    async fn test_start_leaves_status_readable_after_shutdown() {
        let (collector, _, _) = collector(account_response()).await;
        let status = collector.status();
        let cancel = CancellationToken::new();

        let handles = Arc::clone(&collector).start(None, None, cancel.clone()).await;
        assert_eq!(handles.len(), 3);
        while status.get(PRICES_TASK).await.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(status.snapshot().await.contains_key(PRICES_TASK));
        assert_eq!(collector.homes().await.len(), 2);
    }
}
