use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::overview::{BayView, OverviewResponse},
    error::AppError,
    services::overview_service,
    state::SharedState,
};

/// Routes serving the shared overview snapshot.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/overview", get(get_overview))
        .route("/bays", get(list_bays))
}

#[utoipa::path(
    get,
    path = "/overview",
    tag = "overview",
    responses((status = 200, description = "Facility summary plus one row per bay", body = OverviewResponse))
)]
/// Full snapshot used by newly connecting or polling observers.
pub async fn get_overview(
    State(state): State<SharedState>,
) -> Result<Json<OverviewResponse>, AppError> {
    let snapshot = overview_service::snapshot(&state).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    get,
    path = "/bays",
    tag = "overview",
    responses((status = 200, description = "Bay rows only, for grid rendering", body = [BayView]))
)]
/// Bay rows without the facility summary.
pub async fn list_bays(State(state): State<SharedState>) -> Result<Json<Vec<BayView>>, AppError> {
    let snapshot = overview_service::snapshot(&state).await?;
    Ok(Json(snapshot.bays))
}
