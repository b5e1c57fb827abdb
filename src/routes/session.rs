use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dao::models::CloseReason,
    dto::session::{
        DeliveryRequest, DeliveryResponse, EndSessionResponse, StartSessionRequest,
        StartSessionResponse,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes covering the session lifecycle: placement, deliveries, closing.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/bays/{id}/sessions", post(start_session))
        .route("/assignments/{id}/deliveries", post(record_delivery))
        .route("/assignments/{id}/end", post(end_session))
}

#[utoipa::path(
    post,
    path = "/bays/{id}/sessions",
    tag = "session",
    params(("id" = Uuid, Path, description = "Bay to place the player on")),
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session created", body = StartSessionResponse),
        (status = 409, description = "Bay is not available")
    )
)]
/// Place a player on an available bay.
pub async fn start_session(
    State(state): State<SharedState>,
    Path(bay_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<StartSessionRequest>>,
) -> Result<Json<StartSessionResponse>, AppError> {
    let response = session_service::start_session(&state, bay_id, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/assignments/{id}/deliveries",
    tag = "session",
    params(("id" = Uuid, Path, description = "Assignment receiving the buckets")),
    request_body = DeliveryRequest,
    responses(
        (status = 200, description = "Delivery recorded", body = DeliveryResponse),
        (status = 409, description = "Assignment is not open")
    )
)]
/// Record a bucket handover against an open assignment.
pub async fn record_delivery(
    State(state): State<SharedState>,
    Path(assignment_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<DeliveryRequest>>,
) -> Result<Json<DeliveryResponse>, AppError> {
    let response = session_service::record_ball_delivery(&state, assignment_id, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/assignments/{id}/end",
    tag = "session",
    params(("id" = Uuid, Path, description = "Assignment to close")),
    responses((status = 200, description = "Session ended (no-op when already closed)", body = EndSessionResponse))
)]
/// Close a session. Duplicate clicks are acknowledged without effect.
pub async fn end_session(
    State(state): State<SharedState>,
    Path(assignment_id): Path<Uuid>,
) -> Result<Json<EndSessionResponse>, AppError> {
    let response =
        session_service::end_session(&state, assignment_id, CloseReason::Manual).await?;
    Ok(Json(response))
}
