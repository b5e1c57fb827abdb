use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::{models::CloseReason, range_store::RangeStore},
    dto::{
        overview::BayView,
        sse::{
            BayChangedEvent, DeliveryRecordedEvent, ServerEvent, SessionEndedEvent,
            SessionStartedEvent, SystemStatusEvent,
        },
    },
    services::overview_service,
    state::SharedState,
};

const EVENT_BAY_CHANGED: &str = "bay.changed";
const EVENT_SESSION_STARTED: &str = "session.started";
const EVENT_DELIVERY_RECORDED: &str = "delivery.recorded";
const EVENT_SESSION_ENDED: &str = "session.ended";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Publish a bay's refreshed row: update the cached snapshot, then fan the
/// change out to subscribed observers.
pub async fn publish_bay_changed(state: &SharedState, view: BayView) {
    state.cache_bay_view(view.clone()).await;
    send_event(state, EVENT_BAY_CHANGED, &BayChangedEvent(view));
}

/// Rebuild one bay's row from storage and publish it. Failures are logged
/// and swallowed: broadcasting must never fail the mutation that
/// triggered it.
pub async fn publish_bay_refresh(state: &SharedState, store: &Arc<dyn RangeStore>, bay_id: Uuid) {
    match overview_service::bay_view(store, bay_id, state.now()).await {
        Ok(view) => publish_bay_changed(state, view).await,
        Err(err) => warn!(%bay_id, error = %err, "failed to rebuild bay view for broadcast"),
    }
}

/// Broadcast that a player was placed on a bay.
pub fn broadcast_session_started(
    state: &SharedState,
    assignment_id: Uuid,
    bay_number: u32,
    nickname: &str,
) {
    let payload = SessionStartedEvent {
        assignment_id,
        bay_number,
        nickname: nickname.to_string(),
    };
    send_event(state, EVENT_SESSION_STARTED, &payload);
}

/// Broadcast a recorded bucket handover.
pub fn broadcast_delivery_recorded(
    state: &SharedState,
    assignment_id: Uuid,
    bay_number: u32,
    bucket_count: u32,
    total_balls: u64,
) {
    let payload = DeliveryRecordedEvent {
        assignment_id,
        bay_number,
        bucket_count,
        total_balls,
    };
    send_event(state, EVENT_DELIVERY_RECORDED, &payload);
}

/// Broadcast a closed assignment with its trigger.
pub fn broadcast_session_ended(
    state: &SharedState,
    assignment_id: Uuid,
    bay_number: u32,
    reason: CloseReason,
) {
    let payload = SessionEndedEvent {
        assignment_id,
        bay_number,
        reason: reason_label(reason).to_string(),
    };
    send_event(state, EVENT_SESSION_ENDED, &payload);
}

/// Broadcast a degraded-mode flip.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatusEvent { degraded });
}

fn reason_label(reason: CloseReason) -> &'static str {
    match reason {
        CloseReason::Manual => "manual",
        CloseReason::TimedExpiry => "timed_expiry",
        CloseReason::Override => "override",
        CloseReason::Reconciliation => "reconciliation",
    }
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.overview_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize overview SSE payload"),
    }
}
