//! Live feed client
//!
//! Opens `GET {base}/api/live-data/{home}` and appends every unnamed event
//! to a [`MeasurementStore`]. A transport failure is logged and closes the
//! feed unless a [`ReconnectPolicy`] allows another attempt.

use futures_util::StreamExt;
use reqwest::{header, Client, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::sse::{SseDecoder, SseEvent};
use super::store::MeasurementStore;
use super::FeedError;
use crate::model::LiveData;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
const UPDATE_CAPACITY: usize = 64;

/// Reason recorded when the owner closes the feed
pub const CLOSED_BY_CLIENT: &str = "closed by client";

/// Retry budget after a transport error
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the given attempt (1-based): doubling, capped at 30 s
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(MAX_RECONNECT_DELAY)
            .min(MAX_RECONNECT_DELAY)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// API base URL, e.g. `http://localhost:8080`
    pub base_url: String,
    pub connect_timeout: Duration,
    /// `None` closes the feed on the first error
    pub reconnect: Option<ReconnectPolicy>,
}

impl FeedConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            reconnect: None,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Stream URL for a home
    pub fn live_url(&self, home_id: &str) -> Result<Url, FeedError> {
        let raw = format!(
            "{}/api/live-data/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(home_id)
        );
        let url = Url::parse(&raw).map_err(|e| FeedError::InvalidUrl(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FeedError::InvalidUrl(format!("unsupported scheme {}", other))),
        }
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Open,
    /// Terminal; carries the reason
    Closed(String),
}

impl FeedState {
    pub fn is_closed(&self) -> bool {
        matches!(self, FeedState::Closed(_))
    }
}

struct Connection {
    cancel: CancellationToken,
    state: Arc<watch::Sender<FeedState>>,
    task: JoinHandle<()>,
}

impl Connection {
    fn close(&self, reason: &str) {
        self.cancel.cancel();
        self.task.abort();
        self.state.send_if_modified(|current| {
            if current.is_closed() {
                return false;
            }
            *current = FeedState::Closed(reason.to_string());
            true
        });
    }
}

/// A live measurement stream for one home at a time
pub struct LiveFeed {
    config: FeedConfig,
    client: Client,
    store: MeasurementStore,
    updates: broadcast::Sender<LiveData>,
    home_id: String,
    connection: Connection,
}

impl LiveFeed {
    /// Start streaming `home_id` into `store`. Returns once the connection
    /// task is spawned; watch [`LiveFeed::state`] for progress.
    pub fn connect(
        config: FeedConfig,
        home_id: impl Into<String>,
        store: MeasurementStore,
    ) -> Result<Self, FeedError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let home_id = home_id.into();

        let connection = spawn_connection(&config, &client, &home_id, &store, &updates)?;

        Ok(Self {
            config,
            client,
            store,
            updates,
            home_id,
            connection,
        })
    }

    pub fn home_id(&self) -> &str {
        &self.home_id
    }

    pub fn store(&self) -> &MeasurementStore {
        &self.store
    }

    pub fn state(&self) -> FeedState {
        self.connection.state.borrow().clone()
    }

    /// Records as they are appended, across home switches
    pub fn updates(&self) -> broadcast::Receiver<LiveData> {
        self.updates.subscribe()
    }

    /// Wait until the feed reaches a state matching `predicate`
    pub async fn wait_for_state<F>(&self, predicate: F) -> FeedState
    where
        F: Fn(&FeedState) -> bool,
    {
        let mut rx = self.connection.state.subscribe();
        let result = rx.wait_for(|s| predicate(s)).await.map(|s| s.clone());
        result.unwrap_or_else(|_| self.state())
    }

    /// Resolve with the close reason
    pub async fn closed(&self) -> String {
        match self.wait_for_state(FeedState::is_closed).await {
            FeedState::Closed(reason) => reason,
            _ => CLOSED_BY_CLIENT.to_string(),
        }
    }

    /// Release the connection
    pub fn close(&self) {
        self.connection.close(CLOSED_BY_CLIENT);
        tracing::debug!(home_id = %self.home_id, "Live feed closed");
    }

    /// Close the current connection, then stream another home
    pub fn switch_home(&mut self, home_id: impl Into<String>) -> Result<(), FeedError> {
        let home_id = home_id.into();
        if home_id == self.home_id && !self.state().is_closed() {
            return Ok(());
        }

        self.connection.close("switched home");
        self.connection =
            spawn_connection(&self.config, &self.client, &home_id, &self.store, &self.updates)?;
        tracing::info!(from = %self.home_id, to = %home_id, "Live feed switched home");
        self.home_id = home_id;
        Ok(())
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.connection.close(CLOSED_BY_CLIENT);
    }
}

fn spawn_connection(
    config: &FeedConfig,
    client: &Client,
    home_id: &str,
    store: &MeasurementStore,
    updates: &broadcast::Sender<LiveData>,
) -> Result<Connection, FeedError> {
    let url = config.live_url(home_id)?;
    let cancel = CancellationToken::new();
    let state = Arc::new(watch::channel(FeedState::Connecting).0);

    let worker = FeedWorker {
        client: client.clone(),
        url,
        home_id: home_id.to_string(),
        store: store.clone(),
        updates: updates.clone(),
        state: Arc::clone(&state),
        reconnect: config.reconnect.clone(),
        retry_hint: None,
        last_event_id: None,
    };

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = worker.run() => {}
            }
        })
    };

    Ok(Connection {
        cancel,
        state,
        task,
    })
}

struct FeedWorker {
    client: Client,
    url: Url,
    home_id: String,
    store: MeasurementStore,
    updates: broadcast::Sender<LiveData>,
    state: Arc<watch::Sender<FeedState>>,
    reconnect: Option<ReconnectPolicy>,
    /// Reconnect delay announced by the server with `retry:`
    retry_hint: Option<Duration>,
    /// Sent back as `Last-Event-ID` on reconnect
    last_event_id: Option<String>,
}

impl FeedWorker {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            let error = match self.stream_once(&mut attempt).await {
                Ok(()) => FeedError::StreamEnded,
                Err(e) => e,
            };
            tracing::error!(home_id = %self.home_id, error = %error, "Live feed error");

            match &self.reconnect {
                Some(policy) if attempt < policy.max_attempts => {
                    attempt += 1;
                    let delay = self.reconnect_delay(policy, attempt);
                    tracing::info!(home_id = %self.home_id, attempt, ?delay, "Reconnecting live feed");
                    self.set_state(FeedState::Connecting);
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    self.set_state(FeedState::Closed(error.to_string()));
                    return;
                }
            }
        }
    }

    /// Policy delay, using the server's `retry:` value as the base when sent
    fn reconnect_delay(&self, policy: &ReconnectPolicy, attempt: u32) -> Duration {
        match self.retry_hint {
            Some(base_delay) => ReconnectPolicy {
                base_delay,
                ..policy.clone()
            }
            .delay(attempt),
            None => policy.delay(attempt),
        }
    }

    /// Move to `next` unless the feed is already closed
    fn set_state(&self, next: FeedState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_closed() || *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    /// One connection; `Ok` when the server ended the stream
    async fn stream_once(&mut self, attempt: &mut u32) -> Result<(), FeedError> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(id) = &self.last_event_id {
            request = request.header("Last-Event-ID", id.as_str());
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        tracing::info!(home_id = %self.home_id, url = %self.url, "Live feed open");
        self.set_state(FeedState::Open);
        *attempt = 0;

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                self.handle_event(event).await;
            }
            if decoder.retry().is_some() {
                self.retry_hint = decoder.retry();
            }
            if let Some(id) = decoder.last_event_id() {
                self.last_event_id = Some(id.to_string());
            }
        }

        Ok(())
    }

    async fn handle_event(&self, event: SseEvent) {
        if !event.is_message() {
            tracing::trace!(home_id = %self.home_id, event = %event.event, "Ignoring named event");
            return;
        }

        let payload = event.data.trim();
        if payload.is_empty() || payload == "{}" {
            tracing::debug!(home_id = %self.home_id, "Skipping empty live payload");
            return;
        }

        match serde_json::from_str::<LiveData>(payload) {
            Ok(record) => {
                self.store.append(&self.home_id, record.clone()).await;
                let _ = self.updates.send(record);
            }
            Err(e) => {
                tracing::warn!(home_id = %self.home_id, error = %e, "Skipping unparsable live payload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_doubles_and_caps() {
        let policy = ReconnectPolicy::new(10, Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(6), MAX_RECONNECT_DELAY);
        assert_eq!(policy.delay(40), MAX_RECONNECT_DELAY);
    }

    #[test]
    fn test_live_url_encodes_home() {
        let config = FeedConfig::new("http://localhost:8080/");
        let url = config.live_url("home 1/ä").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/live-data/home%201%2F%C3%A4"
        );

        assert!(FeedConfig::new("ftp://example.com").live_url("h").is_err());
        assert!(FeedConfig::new("not a url").live_url("h").is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_closes_feed() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let feed = LiveFeed::connect(
            FeedConfig::new(format!("http://{}", addr)),
            "home-1",
            MeasurementStore::new(),
        )
        .unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(10), feed.closed())
            .await
            .unwrap();
        assert!(reason.starts_with("Request failed"), "{}", reason);
    }

    fn worker(state: &Arc<watch::Sender<FeedState>>) -> FeedWorker {
        FeedWorker {
            client: Client::new(),
            url: FeedConfig::new("http://127.0.0.1:9").live_url("home-1").unwrap(),
            home_id: "home-1".to_string(),
            store: MeasurementStore::new(),
            updates: broadcast::channel(1).0,
            state: Arc::clone(state),
            reconnect: None,
            retry_hint: None,
            last_event_id: None,
        }
    }

    #[test]
    fn test_server_retry_sets_reconnect_base() {
        let state = Arc::new(watch::channel(FeedState::Connecting).0);
        let mut worker = worker(&state);
        let policy = ReconnectPolicy::new(3, Duration::from_secs(1));

        assert_eq!(worker.reconnect_delay(&policy, 2), Duration::from_secs(2));

        let mut decoder = SseDecoder::new();
        decoder.feed(b"retry: 200\n\n");
        worker.retry_hint = decoder.retry();
        assert_eq!(worker.reconnect_delay(&policy, 1), Duration::from_millis(200));
        assert_eq!(worker.reconnect_delay(&policy, 2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_worker_cannot_reopen_closed_feed() {
        let state = Arc::new(watch::channel(FeedState::Connecting).0);
        let worker = worker(&state);

        assert!(worker.set_state(FeedState::Open));
        state.send_replace(FeedState::Closed(CLOSED_BY_CLIENT.to_string()));

        assert!(!worker.set_state(FeedState::Open));
        assert!(!worker.set_state(FeedState::Closed("late error".to_string())));
        assert_eq!(*state.borrow(), FeedState::Closed(CLOSED_BY_CLIENT.to_string()));
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let feed = LiveFeed::connect(
            FeedConfig::new("http://127.0.0.1:9"),
            "home-1",
            MeasurementStore::new(),
        )
        .unwrap();

        feed.close();
        assert_eq!(feed.state(), FeedState::Closed(CLOSED_BY_CLIENT.to_string()));
    }
}
