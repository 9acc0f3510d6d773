//! Ticker endpoints: snapshot pull and SSE push stream.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use taskpulse_core::ticker::TrackedValue;
use tracing::{debug, info};

use crate::state::AppState;

/// Current prices, for the initial page load.
pub async fn current_prices(State(state): State<AppState>) -> Json<Vec<TrackedValue>> {
    Json(state.ticker.snapshot().as_ref().clone())
}

/// Live prices: one event per tick carrying the full snapshot.
pub async fn stream_prices(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.ticker.subscribe();
    let retry = state.config.sse_retry();
    info!(
        subscriber = ?subscription.id(),
        subscribers = state.ticker.subscriber_count(),
        "Push-stream client connected"
    );

    let snapshots = stream::unfold(subscription, |mut subscription| async move {
        let snapshot = subscription.recv().await?;
        Some((snapshot, subscription))
    });

    let events = snapshots
        .map(move |snapshot| {
            debug!(values = snapshot.len(), "Sending snapshot to stream client");
            Event::default().retry(retry).json_data(snapshot.as_ref())
        })
        .take_until(state.closed());

    Sse::new(events).keep_alive(KeepAlive::default())
}
