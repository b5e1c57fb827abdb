use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/overview",
    tag = "sse",
    responses((status = 200, description = "Shared overview SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream realtime bay updates to every connected staff screen.
///
/// All roles consume this one feed; a reconnecting client should first pull
/// `/overview` for the full snapshot, then follow incremental events here.
pub async fn overview_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_overview(&state);
    info!("new overview SSE connection");
    let degraded = state.is_degraded().await;
    sse_service::broadcast_handshake(state.overview_sse(), degraded);
    sse_service::to_sse_stream(receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/overview", get(overview_stream))
}
