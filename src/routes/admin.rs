use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::post,
};
use axum_valid::Valid;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    dto::{
        reconcile::ReconcileReport,
        session::{OverrideRequest, OverrideResponse},
    },
    error::AppError,
    services::{reconcile_service, session_service},
    state::SharedState,
};

/// Routes for administrative overrides and recovery sweeps.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/bays/{id}/override", post(override_bay))
        .route("/admin/reconcile", post(reconcile))
}

#[utoipa::path(
    post,
    path = "/bays/{id}/override",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Bay to override")),
    request_body = OverrideRequest,
    responses(
        (status = 200, description = "Override applied", body = OverrideResponse),
        (status = 409, description = "Override not valid in the bay's current state")
    )
)]
/// Apply an administrative override to a bay.
pub async fn override_bay(
    State(state): State<SharedState>,
    Path(bay_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<OverrideRequest>>,
) -> Result<Json<OverrideResponse>, AppError> {
    let response = session_service::override_bay(&state, bay_id, payload).await?;
    Ok(Json(response))
}

/// Query flag switching the reconcile sweep from dry run to apply.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReconcileQuery {
    /// Close the reported assignments instead of only listing them.
    #[serde(default)]
    pub apply: bool,
}

#[utoipa::path(
    post,
    path = "/admin/reconcile",
    tag = "admin",
    params(ReconcileQuery),
    responses((status = 200, description = "Open assignments grouped by bay", body = ReconcileReport))
)]
/// Scan for dangling open assignments, optionally closing them.
pub async fn reconcile(
    State(state): State<SharedState>,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ReconcileReport>, AppError> {
    let report = reconcile_service::reconcile(&state, query.apply).await?;
    Ok(Json(report))
}
