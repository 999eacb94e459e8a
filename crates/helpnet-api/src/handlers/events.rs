//! /events handler: session events as server-sent events.
//!
//! Each SSE message carries one JSON-encoded `SessionEvent`. A client that
//! falls behind receives a `lagged` event with the number of events it
//! missed and should re-fetch `/status`.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;

use helpnet_services::SessionEvent;

use super::ApiState;

pub async fn handle_events(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.session.subscribe();
    tracing::debug!("event stream client connected");

    let events = stream::unfold(rx, |mut rx| async move {
        let event = match rx.recv().await {
            Ok(event) => to_sse(&event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event stream client lagged");
                Event::default().event("lagged").data(skipped.to_string())
            }
            Err(RecvError::Closed) => return None,
        };
        Some((Ok(event), rx))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &SessionEvent) -> Event {
    match Event::default().json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode session event");
            Event::default().event("error").data(e.to_string())
        }
    }
}
