use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    state::{SharedState, SseHub},
};

/// Subscribe to the shared overview SSE stream.
pub fn subscribe_overview(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.overview_sse().subscribe()
}

/// Convert a broadcast receiver into an SSE response, forwarding events
/// until the client disconnects.
///
/// A subscriber that falls behind the channel capacity skips the missed
/// events and keeps the stream alive; it is expected to re-pull the full
/// snapshot rather than rely on buffered history.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        tracing::info!("overview SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Announce a fresh subscription on the overview stream, carrying the
/// degraded flag so new observers know whether to trust live updates.
pub fn broadcast_handshake(hub: &SseHub, degraded: bool) {
    let handshake = Handshake {
        stream: "overview".to_string(),
        message: "overview stream connected".to_string(),
        degraded,
    };
    if let Ok(event) = ServerEvent::json(Some("handshake".to_string()), &handshake) {
        hub.broadcast(event);
    }
}
