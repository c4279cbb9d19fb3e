//! Server-sent event handlers
//!
//! `GET /api/live-data/:home_id` streams every published `LiveData` record
//! for the home as an unnamed event. The stream opens with a `ready` event
//! and, when one is cached, the most recent record.
//!
//! `GET /events/price/:home_id` sends the stored `PriceInfo` as a
//! `price-update` event on connect and after every price refresh.

use axum::{
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiError, ApiResult, AppState};
use crate::model::{LiveData, PriceInfo};

/// Event name announcing an open stream
pub const READY_EVENT: &str = "ready";
/// Event name for price refreshes
pub const PRICE_EVENT: &str = "price-update";

fn live_event(data: &LiveData) -> Option<Event> {
    match Event::default().json_data(data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode live data event");
            None
        }
    }
}

fn price_event(info: &PriceInfo) -> Option<Event> {
    match Event::default().event(PRICE_EVENT).json_data(info) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode price event");
            None
        }
    }
}

fn keep_alive(state: &AppState) -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(state.config.keep_alive_secs.max(1)))
        .text("keep-alive")
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// End the stream when the server shuts down so graceful shutdown can finish
fn until_shutdown<S>(state: &AppState, events: S) -> EventStream
where
    S: Stream<Item = Event> + Send + 'static,
{
    Box::pin(
        events
            .map(Ok::<_, Infallible>)
            .take_until(state.shutdown.clone().cancelled_owned()),
    )
}

/// Live measurement stream for one home
pub async fn live_data_stream(
    State(state): State<Arc<AppState>>,
    Path(home_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.require_home(&home_id)?;

    let (subscriber, latest) = state
        .hub
        .subscribe_with_latest(&home_id)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    let ready = Event::default()
        .event(READY_EVENT)
        .data(json!({ "connectionId": subscriber.id(), "homeId": home_id }).to_string());

    let mut initial = vec![ready];
    if let Some(latest) = latest {
        initial.extend(live_event(&latest));
    }

    let updates = subscriber.into_stream().filter_map(|data| async move { live_event(&data) });
    let events = until_shutdown(&state, stream::iter(initial).chain(updates));

    Ok((
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(events).keep_alive(keep_alive(&state)),
    ))
}

/// Price refresh stream for one home
pub async fn price_stream(
    State(state): State<Arc<AppState>>,
    Path(home_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.require_home(&home_id)?;

    let subscriber = state
        .hub
        .subscribe_prices(&home_id)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    let initial: Vec<Event> = state
        .store
        .price_info(&home_id)?
        .as_ref()
        .and_then(price_event)
        .into_iter()
        .collect();

    let store = Arc::clone(&state.store);
    let updates = subscriber.into_stream().filter_map(move |()| {
        let store = Arc::clone(&store);
        let home_id = home_id.clone();
        async move {
            match store.price_info(&home_id) {
                Ok(info) => info.as_ref().and_then(price_event),
                Err(e) => {
                    tracing::warn!(home_id = %home_id, error = %e, "Failed to load prices for event");
                    None
                }
            }
        }
    });
    let events = until_shutdown(&state, stream::iter(initial).chain(updates));

    Ok((
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(events).keep_alive(keep_alive(&state)),
    ))
}
