use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Range Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::overview_stream,
        crate::routes::overview::get_overview,
        crate::routes::overview::list_bays,
        crate::routes::session::start_session,
        crate::routes::session::record_delivery,
        crate::routes::session::end_session,
        crate::routes::admin::override_bay,
        crate::routes::admin::reconcile,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::overview::BayView,
            crate::dto::overview::OverviewResponse,
            crate::dto::overview::OverviewSummary,
            crate::dto::overview::PlayerSummary,
            crate::dto::session::StartSessionRequest,
            crate::dto::session::StartSessionResponse,
            crate::dto::session::DeliveryRequest,
            crate::dto::session::DeliveryResponse,
            crate::dto::session::EndSessionResponse,
            crate::dto::session::OverrideRequest,
            crate::dto::session::OverrideResponse,
            crate::dto::session::OverrideAction,
            crate::dto::reconcile::ReconcileReport,
            crate::dto::reconcile::ReconcileBayReport,
            crate::dto::reconcile::ReconcileAssignment,
            crate::dto::sse::Handshake,
            crate::dao::models::BayStatus,
            crate::dao::models::SessionKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "overview", description = "Bay overview snapshots"),
        (name = "session", description = "Session lifecycle operations"),
        (name = "admin", description = "Administrative overrides and recovery"),
    )
)]
pub struct ApiDoc;
