//! Server-Sent Events (SSE) broadcaster
//!
//! Streams playback events to connected clients. Every new subscriber
//! first receives an `InitialState` snapshot, then the live feed.

use crate::api::server::AppContext;
use crate::session::Session;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::{Stream, StreamExt};
use quaver_common::QuaverEvent;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let session = ctx.session.clone();
    // Subscribe before taking the snapshot so nothing between the two is lost
    let rx = session.state().events.subscribe();

    let stream = async_stream::stream! {
        if let Some(event) = to_sse_event(&initial_state(&session).await) {
            yield Ok(event);
        }

        let mut live = BroadcastStream::new(rx);
        while let Some(result) = live.next().await {
            match result {
                Ok(event) => {
                    if let Some(event) = to_sse_event(&event) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    // Lagged subscriber: skip the gap, stay on the stream
                    warn!("SSE stream error: {:?}", e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Snapshot of everything a fresh client needs to render.
async fn initial_state(session: &Arc<Session>) -> QuaverEvent {
    let state = session.state().get_playback_state().await;
    let mode = session.state().get_play_mode().await;
    let (tracks, position) = session.playlist().snapshot().await;
    let progress = session.state().get_progress().await;

    QuaverEvent::InitialState {
        state,
        mode,
        position,
        playlist_length: tracks.len(),
        position_ms: progress.position_ms,
        duration_ms: progress.duration_ms,
        timestamp: chrono::Utc::now(),
    }
}

fn to_sse_event(event: &QuaverEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_name()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
