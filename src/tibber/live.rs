//! Real-time measurement subscription
//!
//! Speaks `graphql-transport-ws`:
//!
//! ```text
//! client: connection_init {token}      server: connection_ack
//! client: subscribe {id: "1", query}   server: next* (complete | error)
//! server: ping                         client: pong
//! client: complete {id: "1"}           (on cancellation)
//! ```

use super::client::USER_AGENT;
use super::queries;
use super::TibberError;
use crate::config::TibberConfig;
use crate::model::Measurement;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

const SUBPROTOCOL: &str = "graphql-transport-ws";
const SUBSCRIPTION_ID: &str = "1";
const ACK_TIMEOUT: Duration = Duration::from_secs(10);
const CHANNEL_CAPACITY: usize = 256;

/// A stream of live measurements for one home.
///
/// The returned receiver closes when the upstream subscription ends for any
/// reason; callers decide whether to subscribe again.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    async fn subscribe(
        &self,
        home_id: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Measurement>, TibberError>;
}

/// Protocol envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ProtocolMessage {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
            payload: None,
        }
    }

    pub fn connection_init(token: &str) -> Self {
        Self {
            payload: Some(json!({ "token": token })),
            ..Self::new("connection_init")
        }
    }

    pub fn subscribe(home_id: &str) -> Self {
        Self {
            id: Some(SUBSCRIPTION_ID.to_string()),
            payload: Some(json!({
                "query": queries::LIVE_MEASUREMENT,
                "variables": { "homeId": home_id },
            })),
            ..Self::new("subscribe")
        }
    }

    pub fn complete() -> Self {
        Self {
            id: Some(SUBSCRIPTION_ID.to_string()),
            ..Self::new("complete")
        }
    }

    pub fn pong() -> Self {
        Self::new("pong")
    }

    fn to_frame(&self) -> Result<Message, TibberError> {
        let text = serde_json::to_string(self).map_err(|e| TibberError::Decode(e.to_string()))?;
        Ok(Message::Text(text))
    }
}

/// What to do with one server message
#[derive(Debug, PartialEq)]
pub enum LiveEvent {
    Measurement(Measurement),
    /// `next` without a usable sample
    Skip(String),
    Ping,
    Complete,
    Error(String),
    Unknown(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextData {
    #[serde(default)]
    live_measurement: Option<Measurement>,
}

#[derive(Debug, Deserialize)]
struct NextPayload {
    #[serde(default)]
    data: Option<NextData>,
}

/// Classify a server message
pub fn interpret(message: ProtocolMessage) -> LiveEvent {
    match message.kind.as_str() {
        "next" => {
            let payload = message.payload.unwrap_or(Value::Null);
            match serde_json::from_value::<NextPayload>(payload) {
                Ok(NextPayload {
                    data:
                        Some(NextData {
                            live_measurement: Some(m),
                        }),
                }) => {
                    if m.timestamp.is_some() {
                        LiveEvent::Measurement(m)
                    } else {
                        LiveEvent::Skip("measurement without timestamp".to_string())
                    }
                }
                Ok(_) => LiveEvent::Skip("payload without liveMeasurement".to_string()),
                Err(e) => LiveEvent::Skip(format!("undecodable payload: {}", e)),
            }
        }
        "error" => LiveEvent::Error(
            message
                .payload
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unspecified".to_string()),
        ),
        "complete" => LiveEvent::Complete,
        "ping" => LiveEvent::Ping,
        other => LiveEvent::Unknown(other.to_string()),
    }
}

/// Tibber WebSocket subscription
pub struct LiveSubscription {
    endpoint: String,
    token: String,
}

impl LiveSubscription {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &TibberConfig) -> Self {
        Self::new(config.ws_endpoint.clone(), config.token.clone())
    }
}

#[async_trait]
impl MeasurementSource for LiveSubscription {
    async fn subscribe(
        &self,
        home_id: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Measurement>, TibberError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TibberError::WebSocket(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .map_err(|e| TibberError::WebSocket(e.to_string()))?,
        );

        tracing::info!(endpoint = %self.endpoint, home_id = %home_id, "Connecting to Tibber live feed");
        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TibberError::WebSocket(e.to_string()))?;
        let (mut write, mut read) = socket.split();

        write
            .send(ProtocolMessage::connection_init(&self.token).to_frame()?)
            .await
            .map_err(|e| TibberError::WebSocket(e.to_string()))?;

        tokio::time::timeout(ACK_TIMEOUT, await_ack(&mut read, &mut write))
            .await
            .map_err(|_| TibberError::Protocol("timed out waiting for connection_ack".to_string()))??;
        tracing::debug!(home_id = %home_id, "Live feed acknowledged");

        write
            .send(ProtocolMessage::subscribe(home_id).to_frame()?)
            .await
            .map_err(|e| TibberError::WebSocket(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let home_id = home_id.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Ok(frame) = ProtocolMessage::complete().to_frame() {
                            let _ = write.send(frame).await;
                        }
                        let _ = write.close().await;
                        tracing::info!(home_id = %home_id, "Live feed closed");
                        break;
                    }
                    frame = read.next() => {
                        let text = match frame {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Close(reason))) => {
                                tracing::warn!(home_id = %home_id, reason = ?reason, "Live feed closed by server");
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                tracing::warn!(home_id = %home_id, error = %e, "Live feed read failed");
                                break;
                            }
                            None => {
                                tracing::warn!(home_id = %home_id, "Live feed ended");
                                break;
                            }
                        };

                        let message = match serde_json::from_str::<ProtocolMessage>(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::warn!(home_id = %home_id, error = %e, "Unparsable live feed message");
                                continue;
                            }
                        };

                        match interpret(message) {
                            LiveEvent::Measurement(m) => {
                                if tx.send(m).await.is_err() {
                                    // Consumer went away
                                    if let Ok(frame) = ProtocolMessage::complete().to_frame() {
                                        let _ = write.send(frame).await;
                                    }
                                    break;
                                }
                            }
                            LiveEvent::Skip(reason) => {
                                tracing::debug!(home_id = %home_id, reason = %reason, "Skipped live message");
                            }
                            LiveEvent::Ping => {
                                if let Ok(frame) = ProtocolMessage::pong().to_frame() {
                                    if write.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            LiveEvent::Error(payload) => {
                                tracing::error!(home_id = %home_id, payload = %payload, "Live feed error message");
                            }
                            LiveEvent::Complete => {
                                tracing::info!(home_id = %home_id, "Live feed completed by server");
                                break;
                            }
                            LiveEvent::Unknown(kind) => {
                                tracing::debug!(home_id = %home_id, kind = %kind, "Unknown live message type");
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Wait for `connection_ack`, answering any pings that arrive first
async fn await_ack<R, W>(read: &mut R, write: &mut W) -> Result<(), TibberError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
    W: Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    while let Some(frame) = read.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(TibberError::WebSocket(e.to_string())),
        };

        let message: ProtocolMessage =
            serde_json::from_str(&text).map_err(|e| TibberError::Decode(e.to_string()))?;
        match message.kind.as_str() {
            "connection_ack" => return Ok(()),
            "ping" => write
                .send(ProtocolMessage::pong().to_frame()?)
                .await
                .map_err(|e| TibberError::WebSocket(e.to_string()))?,
            other => {
                return Err(TibberError::Protocol(format!(
                    "expected connection_ack, got {}",
                    other
                )))
            }
        }
    }

    Err(TibberError::Protocol("connection closed before ack".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn next(payload: Value) -> ProtocolMessage {
        ProtocolMessage {
            kind: "next".to_string(),
            id: Some("1".to_string()),
            payload: Some(payload),
        }
    }

    #[test]
    fn test_client_messages() {
        let init = serde_json::to_value(ProtocolMessage::connection_init("tok")).unwrap();
        assert_eq!(init, json!({"type": "connection_init", "payload": {"token": "tok"}}));

        let sub = serde_json::to_value(ProtocolMessage::subscribe("home-1")).unwrap();
        assert_eq!(sub["type"], "subscribe");
        assert_eq!(sub["id"], "1");
        assert_eq!(sub["payload"]["variables"]["homeId"], "home-1");
        assert!(sub["payload"]["query"].as_str().unwrap().contains("liveMeasurement"));

        let complete = serde_json::to_value(ProtocolMessage::complete()).unwrap();
        assert_eq!(complete, json!({"type": "complete", "id": "1"}));
        assert_eq!(
            serde_json::to_value(ProtocolMessage::pong()).unwrap(),
            json!({"type": "pong"})
        );
    }

    #[test]
    fn test_next_with_measurement() {
        let event = interpret(next(json!({"data": {"liveMeasurement": {
            "timestamp": "2024-03-02T13:00:00.000+01:00",
            "power": 1500,
            "accumulatedConsumption": 2.5
        }}})));

        match event {
            LiveEvent::Measurement(m) => {
                assert_eq!(m.timestamp, Some(Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()));
                assert_eq!(m.power, 1500.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_next_without_timestamp_is_skipped() {
        let event = interpret(next(json!({"data": {"liveMeasurement": {"power": 1}}})));
        assert!(matches!(event, LiveEvent::Skip(_)));

        let event = interpret(next(json!({"data": null})));
        assert!(matches!(event, LiveEvent::Skip(_)));

        let event = interpret(next(json!("garbage")));
        assert!(matches!(event, LiveEvent::Skip(_)));
    }

    #[test]
    fn test_control_messages() {
        assert_eq!(interpret(ProtocolMessage::new("ping")), LiveEvent::Ping);
        assert_eq!(interpret(ProtocolMessage::new("complete")), LiveEvent::Complete);
        assert_eq!(
            interpret(ProtocolMessage::new("ka")),
            LiveEvent::Unknown("ka".to_string())
        );

        let error = ProtocolMessage {
            kind: "error".to_string(),
            id: Some("1".to_string()),
            payload: Some(json!([{"message": "home not found"}])),
        };
        assert!(matches!(interpret(error), LiveEvent::Error(ref p) if p.contains("home not found")));
    }

    #[test]
    fn test_parse_server_ack() {
        let msg: ProtocolMessage = serde_json::from_str(r#"{"type":"connection_ack"}"#).unwrap();
        assert_eq!(msg.kind, "connection_ack");
        assert!(msg.payload.is_none());
    }

    fn frames(kinds: &[&str]) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        let frames: Vec<_> = kinds
            .iter()
            .map(|kind| Ok(Message::Text(format!(r#"{{"type":"{}"}}"#, kind))))
            .collect();
        futures_util::stream::iter(frames)
    }

    #[tokio::test]
    async fn test_ack_after_ping_is_accepted() {
        let (tx, mut sent) = mpsc::channel(4);
        let mut write = tokio_util::sync::PollSender::new(tx);

        await_ack(&mut frames(&["ping", "connection_ack"]), &mut write)
            .await
            .unwrap();

        let pong = match sent.recv().await {
            Some(Message::Text(text)) => serde_json::from_str::<ProtocolMessage>(&text).unwrap(),
            other => panic!("expected pong, got {:?}", other),
        };
        assert_eq!(pong.kind, "pong");
    }

    #[tokio::test]
    async fn test_ack_rejects_other_first_message() {
        let (tx, _sent) = mpsc::channel(4);
        let mut write = tokio_util::sync::PollSender::new(tx);

        let err = await_ack(&mut frames(&["next"]), &mut write).await.unwrap_err();
        assert!(matches!(err, TibberError::Protocol(ref m) if m.contains("got next")));

        let err = await_ack(&mut frames(&[]), &mut write).await.unwrap_err();
        assert!(matches!(err, TibberError::Protocol(ref m) if m.contains("closed before ack")));
    }
}
