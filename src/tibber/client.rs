//! Tibber GraphQL HTTP client

use super::TibberError;
use crate::config::TibberConfig;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("wattboard/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the Tibber GraphQL API
pub struct TibberClient {
    client: Client,
    config: TibberConfig,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    #[serde(default)]
    message: String,
}

impl TibberClient {
    pub fn new(config: TibberConfig) -> Result<Self, TibberError> {
        if !config.has_token() {
            return Err(TibberError::NoToken);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TibberConfig {
        &self.config
    }

    /// Run a GraphQL document and decode its `data` member
    pub async fn query<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Option<Value>,
    ) -> Result<T, TibberError> {
        let body = GraphQlRequest {
            query: document,
            variables: variables.as_ref(),
        };

        let response = self.send_with_retry(&body).await?;
        let parsed: GraphQlResponse = response.json().await?;

        if let Some(first) = parsed.errors.first() {
            return Err(TibberError::GraphQl(first.message.clone()));
        }

        let data = parsed.data.filter(|d| !d.is_null()).ok_or(TibberError::MissingData)?;
        serde_json::from_value(data).map_err(|e| TibberError::Decode(e.to_string()))
    }

    /// POST with retry on transport failures and rate limiting
    async fn send_with_retry(
        &self,
        body: &GraphQlRequest<'_>,
    ) -> Result<reqwest::Response, TibberError> {
        let mut last_error = TibberError::Unavailable;

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                // Backoff: 1s, 4s, 9s...
                let delay = Duration::from_secs((attempt as u64).pow(2));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "Retrying Tibber request");
                tokio::time::sleep(delay).await;
            }

            let result = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&self.config.token)
                .header(header::CONTENT_TYPE, "application/json")
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if let Some(secs) = response
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                    {
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                    }
                    tracing::warn!("Tibber API rate limited");
                    last_error = TibberError::RateLimited;
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    return Err(TibberError::Http { status, message });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Tibber request failed");
                    last_error = if e.is_timeout() {
                        TibberError::Timeout
                    } else if e.is_connect() {
                        TibberError::Unavailable
                    } else {
                        TibberError::Request(e)
                    };
                }
            }
        }

        Err(last_error)
    }
}
