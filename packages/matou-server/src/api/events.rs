//! The live event stream.
//!
//! `GET /events` is a long-lived SSE response: one `event:`/`data:` frame
//! per broadcast event, a comment keepalive every 30 seconds, chunked
//! transfer. Subscribers joining late see only new events; a dropped
//! connection releases its channel on the bus's next broadcast.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;

use crate::state::AppState;

/// GET /events — subscribe to the event stream.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.events().subscribe();
    tracing::debug!(subscriber = %subscription.id, "Event stream opened");

    let stream = futures::stream::unfold(subscription.receiver, |mut rx| async move {
        let event = rx.recv().await?;
        let data = serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string());
        let frame = SseEvent::default()
            .event(event.event_type.as_str())
            .data(data);
        Some((Ok::<_, Infallible>(frame), rx))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    )
}
