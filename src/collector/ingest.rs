//! Live measurement ingest
//!
//! Subscribes to a `MeasurementSource` for one home, drops repeated
//! timestamps, persists every measurement and publishes it to the hub.
//! When the upstream subscription ends the ingest waits and subscribes
//! again until cancelled.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::status::StatusBoard;
use crate::live::LiveHub;
use crate::model::Measurement;
use crate::storage::EnergyStore;
use crate::tibber::MeasurementSource;

/// Status key for live ingest of a home
pub fn task_name(home_id: &str) -> String {
    format!("live:{}", home_id)
}

/// Pipes one home's live measurements into storage and the hub
#[derive(Clone)]
pub struct LiveIngest {
    store: Arc<EnergyStore>,
    hub: Arc<LiveHub>,
    status: Arc<StatusBoard>,
    reconnect_delay: Duration,
}

impl LiveIngest {
    pub fn new(
        store: Arc<EnergyStore>,
        hub: Arc<LiveHub>,
        status: Arc<StatusBoard>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            status,
            reconnect_delay,
        }
    }

    /// Subscribe, forward, and resubscribe until `cancel` fires
    pub async fn run(
        &self,
        source: Arc<dyn MeasurementSource>,
        home_id: String,
        cancel: CancellationToken,
    ) {
        let task = task_name(&home_id);
        let mut last_seen = None;

        while !cancel.is_cancelled() {
            match source.subscribe(&home_id, cancel.child_token()).await {
                Ok(rx) => {
                    tracing::info!(home_id = %home_id, "Live subscription started");
                    let forwarded = self.forward(&home_id, rx, &mut last_seen, &cancel).await;
                    tracing::info!(home_id = %home_id, forwarded, "Live subscription ended");
                    self.status.record_success(&task).await;
                }
                Err(e) => {
                    tracing::error!(home_id = %home_id, error = %e, "Live subscription failed");
                    self.status.record_failure(&task, &e).await;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        tracing::debug!(home_id = %home_id, "Live ingest stopped");
    }

    /// Drain one subscription. Returns the number of records published.
    pub async fn forward(
        &self,
        home_id: &str,
        mut rx: mpsc::Receiver<Measurement>,
        last_seen: &mut Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> usize {
        let mut forwarded = 0;

        loop {
            let measurement = tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(m) => m,
                    None => break,
                },
            };

            let Some(data) = measurement.to_live_data() else {
                tracing::debug!(home_id = %home_id, "Skipping measurement without timestamp");
                continue;
            };

            if *last_seen == Some(data.timestamp) {
                tracing::trace!(home_id = %home_id, timestamp = %data.timestamp, "Duplicate measurement");
                continue;
            }
            *last_seen = Some(data.timestamp);

            if let Err(e) = self.store.store_measurement(home_id, &measurement) {
                tracing::warn!(home_id = %home_id, error = %e, "Failed to store measurement");
            }

            self.hub.publish(home_id, data).await;
            forwarded += 1;
        }

        forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::HubConfig;
    use crate::tibber::TibberError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted batches; each subscribe call takes the next batch
    struct ScriptedSource {
        batches: Mutex<VecDeque<Vec<Measurement>>>,
        subscribes: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Vec<Measurement>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                subscribes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MeasurementSource for ScriptedSource {
        async fn subscribe(
            &self,
            _home_id: &str,
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<Measurement>, TibberError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let batch = self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(TibberError::Unavailable)?;

            let (tx, rx) = mpsc::channel(batch.len().max(1));
            for m in batch {
                tx.send(m).await.unwrap();
            }
            Ok(rx)
        }
    }

    fn at(second: u32, power: f64) -> Measurement {
        Measurement {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, second).unwrap()),
            power,
            ..Default::default()
        }
    }

    fn ingest(store: Arc<EnergyStore>, hub: Arc<LiveHub>, status: Arc<StatusBoard>) -> LiveIngest {
        LiveIngest::new(store, hub, status, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_forward_drops_duplicate_timestamps() {
        let store = Arc::new(EnergyStore::open_in_memory().unwrap());
        let hub = Arc::new(LiveHub::new(HubConfig::default()));
        let ingest = ingest(store.clone(), hub.clone(), Arc::new(StatusBoard::new()));
        let mut sub = hub.subscribe("home-1").await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        tx.send(at(0, 100.0)).await.unwrap();
        tx.send(at(0, 100.0)).await.unwrap();
        tx.send(Measurement::default()).await.unwrap();
        tx.send(at(2, 120.0)).await.unwrap();
        drop(tx);

        let mut last = None;
        let n = ingest
            .forward("home-1", rx, &mut last, &CancellationToken::new())
            .await;

        assert_eq!(n, 2);
        assert_eq!(sub.recv().await.unwrap().power, 100.0);
        assert_eq!(sub.recv().await.unwrap().power, 120.0);
        assert_eq!(store.latest_measurements("home-1", 10).unwrap().len(), 2);
        assert_eq!(last, at(2, 0.0).timestamp);
    }

    #[tokio::test]
    async fn test_run_resubscribes_after_end() {
        let store = Arc::new(EnergyStore::open_in_memory().unwrap());
        let hub = Arc::new(LiveHub::new(HubConfig::default()));
        let status = Arc::new(StatusBoard::new());
        let ingest = ingest(store.clone(), hub.clone(), status.clone());
        let mut sub = hub.subscribe("home-1").await.unwrap();

        // The repeat of second 1 across the reconnect is also dropped
        let source = Arc::new(ScriptedSource::new(vec![
            vec![at(0, 1.0), at(1, 2.0)],
            vec![at(1, 2.0), at(2, 3.0)],
        ]));
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            let source: Arc<dyn MeasurementSource> = source.clone();
            tokio::spawn(async move { ingest.run(source, "home-1".into(), cancel).await })
        };

        let mut powers = Vec::new();
        for _ in 0..3 {
            powers.push(sub.recv().await.unwrap().power);
        }
        assert_eq!(powers, vec![1.0, 2.0, 3.0]);

        // Wait for the exhausted script to be reported
        while source.subscribes.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.latest_measurements("home-1", 10).unwrap().len(), 3);
        let task = status.get(&task_name("home-1")).await.unwrap();
        assert!(task.failures >= 1);
        assert!(task.runs >= 3);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let store = Arc::new(EnergyStore::open_in_memory().unwrap());
        let hub = Arc::new(LiveHub::new(HubConfig::default()));
        let ingest = ingest(store, hub, Arc::new(StatusBoard::new()));
        let source = Arc::new(ScriptedSource::new(vec![vec![at(0, 1.0)]]));

        let cancel = CancellationToken::new();
        cancel.cancel();
        ingest.run(source.clone(), "home-1".into(), cancel).await;
        assert_eq!(source.subscribes.load(Ordering::SeqCst), 0);
    }
}
