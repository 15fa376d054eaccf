//! Server-Sent Events support

use crate::dispatcher::SseEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init_event: SseEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<SseEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move { Ok(sse_event_to_axum(init_event)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(sse_event_to_axum(event))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn sse_event_to_axum(event: SseEvent) -> Event {
    let (event_type, data) = match event {
        SseEvent::Init { snapshot, function } => (
            "init",
            json!({
                "type": "init",
                "turns": snapshot.turns,
                "busy": snapshot.busy,
                "last_seq": snapshot.last_seq,
                "function": function,
            }),
        ),
        SseEvent::Turn { seq, turn } => (
            "turn",
            json!({
                "type": "turn",
                "seq": seq,
                "turn": turn
            }),
        ),
        SseEvent::Busy { busy } => (
            "busy",
            json!({
                "type": "busy",
                "busy": busy
            }),
        ),
        SseEvent::Warning { message } => (
            "warning",
            json!({
                "type": "warning",
                "message": message
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
