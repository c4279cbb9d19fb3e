//! Live Hub
//!
//! Fans live measurements and price-refresh notifications out to per-home
//! subscribers. Channels are created lazily on first use. Every subscriber
//! holds a connection slot that is released when it is dropped.

use futures_util::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::model::LiveData;

/// Unique identifier for a live stream connection
pub type ConnectionId = String;

/// Configuration for the live hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent subscribers across all homes
    pub max_connections: usize,
    /// Capacity of each per-home broadcast channel
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            channel_capacity: 256,
        }
    }
}

struct HomeChannel {
    live: broadcast::Sender<LiveData>,
    prices: broadcast::Sender<()>,
    latest: Option<LiveData>,
}

impl HomeChannel {
    fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity);
        let (prices, _) = broadcast::channel(16);
        Self {
            live,
            prices,
            latest: None,
        }
    }
}

/// Per-home pub/sub for live data
pub struct LiveHub {
    channels: RwLock<HashMap<String, HomeChannel>>,
    connections: Arc<AtomicUsize>,
    config: HubConfig,
}

/// Holds one connection slot until dropped
struct ConnectionSlot {
    id: ConnectionId,
    home_id: String,
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
        tracing::info!(connection_id = %self.id, home_id = %self.home_id, "Live stream disconnected");
    }
}

/// Receiving end of a home's live measurements
pub struct LiveSubscriber {
    receiver: broadcast::Receiver<LiveData>,
    slot: ConnectionSlot,
}

/// Receiving end of a home's price-refresh notifications
pub struct PriceSubscriber {
    receiver: broadcast::Receiver<()>,
    slot: ConnectionSlot,
}

impl LiveHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            connections: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    fn acquire_slot(&self, home_id: &str) -> Result<ConnectionSlot, HubError> {
        let limit = self.config.max_connections;
        self.connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .map_err(|_| HubError::TooManyConnections(limit))?;

        let id = Uuid::new_v4().to_string();
        tracing::info!(connection_id = %id, home_id = %home_id, "Live stream connected");
        Ok(ConnectionSlot {
            id,
            home_id: home_id.to_string(),
            connections: Arc::clone(&self.connections),
        })
    }

    /// Subscribe to a home's live measurements
    pub async fn subscribe(&self, home_id: &str) -> Result<LiveSubscriber, HubError> {
        self.subscribe_with_latest(home_id).await.map(|(subscriber, _)| subscriber)
    }

    /// Subscribe and read the cached record under one lock, so a record is
    /// either the returned latest or arrives on the subscriber, never both.
    pub async fn subscribe_with_latest(
        &self,
        home_id: &str,
    ) -> Result<(LiveSubscriber, Option<LiveData>), HubError> {
        let slot = self.acquire_slot(home_id)?;
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(home_id.to_string())
            .or_insert_with(|| HomeChannel::new(self.config.channel_capacity));

        let subscriber = LiveSubscriber {
            receiver: channel.live.subscribe(),
            slot,
        };
        Ok((subscriber, channel.latest.clone()))
    }

    /// Subscribe to a home's price-refresh notifications
    pub async fn subscribe_prices(&self, home_id: &str) -> Result<PriceSubscriber, HubError> {
        let slot = self.acquire_slot(home_id)?;
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(home_id.to_string())
            .or_insert_with(|| HomeChannel::new(self.config.channel_capacity));

        Ok(PriceSubscriber {
            receiver: channel.prices.subscribe(),
            slot,
        })
    }

    /// Publish a record to a home's subscribers and cache it as the latest.
    ///
    /// Returns the number of subscribers reached; zero is not an error.
    pub async fn publish(&self, home_id: &str, data: LiveData) -> usize {
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(home_id.to_string())
            .or_insert_with(|| HomeChannel::new(self.config.channel_capacity));

        channel.latest = Some(data.clone());
        let reached = channel.live.send(data).unwrap_or(0);

        tracing::trace!(home_id = %home_id, subscribers = reached, "Published live data");
        reached
    }

    /// Tell price stream subscribers that new prices are stored
    pub async fn notify_prices(&self, home_id: &str) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(home_id)
            .and_then(|c| c.prices.send(()).ok())
            .unwrap_or(0)
    }

    /// Last record published for a home
    pub async fn latest(&self, home_id: &str) -> Option<LiveData> {
        self.channels
            .read()
            .await
            .get(home_id)
            .and_then(|c| c.latest.clone())
    }

    /// Number of open subscriber slots across all homes
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Live subscribers for one home
    pub async fn subscriber_count(&self, home_id: &str) -> usize {
        self.channels
            .read()
            .await
            .get(home_id)
            .map(|c| c.live.receiver_count())
            .unwrap_or(0)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}

impl LiveSubscriber {
    pub fn id(&self) -> &str {
        &self.slot.id
    }

    pub fn home_id(&self) -> &str {
        &self.slot.home_id
    }

    /// Next record. Lagged items are skipped; `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<LiveData> {
        loop {
            match self.receiver.recv().await {
                Ok(data) => return Some(data),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(connection_id = %self.slot.id, skipped, "Live subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a stream that keeps the connection slot until dropped
    pub fn into_stream(self) -> impl Stream<Item = LiveData> + Send + 'static {
        let slot = self.slot;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(data) => Some(data),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(connection_id = %slot.id, skipped, "Live subscriber lagged");
                None
            }
        })
    }
}

impl PriceSubscriber {
    pub fn id(&self) -> &str {
        &self.slot.id
    }

    /// Stream of refresh notifications; bursts collapse into fewer items
    pub fn into_stream(self) -> impl Stream<Item = ()> + Send + 'static {
        let slot = self.slot;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(()) => Some(()),
            Err(BroadcastStreamRecvError::Lagged(_)) => {
                tracing::debug!(connection_id = %slot.id, "Price subscriber lagged");
                Some(())
            }
        })
    }
}

/// Errors that can occur in the live hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(power: f64) -> LiveData {
        LiveData {
            timestamp: Utc::now(),
            power,
            power_production: 0.0,
            accumulated_consumption: 0.0,
            accumulated_production: 0.0,
        }
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.channel_capacity, 256);
    }

    #[tokio::test]
    async fn test_publish_reaches_home_subscribers_in_order() {
        let hub = LiveHub::new(HubConfig::default());
        let mut a = hub.subscribe("home-a").await.unwrap();
        let mut b = hub.subscribe("home-b").await.unwrap();

        assert_eq!(hub.publish("home-a", record(1.0)).await, 1);
        assert_eq!(hub.publish("home-a", record(2.0)).await, 1);
        assert_eq!(hub.publish("home-b", record(9.0)).await, 1);

        assert_eq!(a.recv().await.unwrap().power, 1.0);
        assert_eq!(a.recv().await.unwrap().power, 2.0);
        assert_eq!(b.recv().await.unwrap().power, 9.0);
    }

    #[tokio::test]
    async fn test_subscribe_with_latest_delivers_each_record_once() {
        let hub = LiveHub::new(HubConfig::default());
        hub.publish("home", record(1.0)).await;

        let (mut sub, latest) = hub.subscribe_with_latest("home").await.unwrap();
        assert_eq!(latest.unwrap().power, 1.0);

        hub.publish("home", record(2.0)).await;
        assert_eq!(sub.recv().await.unwrap().power, 2.0);

        // The cached record is not replayed on the channel
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await;
        assert!(pending.is_err());

        let (_fresh, latest) = hub.subscribe_with_latest("other").await.unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = LiveHub::new(HubConfig::default());
        assert_eq!(hub.publish("home", record(5.0)).await, 0);
        assert_eq!(hub.latest("home").await.unwrap().power, 5.0);
        assert!(hub.latest("other").await.is_none());
    }

    #[tokio::test]
    async fn test_connection_limit_and_release() {
        let hub = LiveHub::new(HubConfig {
            max_connections: 2,
            channel_capacity: 8,
        });

        let first = hub.subscribe("h").await.unwrap();
        let _second = hub.subscribe_prices("h").await.unwrap();
        assert_eq!(hub.connection_count(), 2);
        assert!(matches!(
            hub.subscribe("h").await,
            Err(HubError::TooManyConnections(2))
        ));

        drop(first);
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.subscribe("h").await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_holds_slot_until_dropped() {
        let hub = LiveHub::new(HubConfig::default());
        let subscriber = hub.subscribe("h").await.unwrap();
        let stream = subscriber.into_stream();
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.subscriber_count("h").await, 1);

        drop(stream);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.subscriber_count("h").await, 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_streaming() {
        let hub = LiveHub::new(HubConfig {
            max_connections: 10,
            channel_capacity: 2,
        });
        let mut sub = hub.subscribe("h").await.unwrap();

        for i in 0..5 {
            hub.publish("h", record(i as f64)).await;
        }

        // Oldest items were overwritten; the newest two remain
        assert_eq!(sub.recv().await.unwrap().power, 3.0);
        assert_eq!(sub.recv().await.unwrap().power, 4.0);
    }

    #[tokio::test]
    async fn test_price_notifications() {
        let hub = LiveHub::new(HubConfig::default());
        assert_eq!(hub.notify_prices("h").await, 0);

        let sub = hub.subscribe_prices("h").await.unwrap();
        assert_eq!(hub.notify_prices("h").await, 1);

        let mut stream = Box::pin(sub.into_stream());
        assert_eq!(stream.next().await, Some(()));
    }
}
