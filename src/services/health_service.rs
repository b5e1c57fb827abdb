use tracing::warn;

use crate::{dao::range_store::RangeStore, dto::health::HealthResponse, state::SharedState};

/// Respond with the current health payload, pinging the storage backend.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_range_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    if state.is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
