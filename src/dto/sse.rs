use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::overview::BayView;

#[derive(Clone, Debug)]
/// Dispatched payload carried across the overview SSE channel.
pub struct ServerEvent {
    /// Optional SSE event name.
    pub event: Option<String>,
    /// Serialized data field.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the stream (always `overview`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatusEvent {
    /// True while no storage backend is reachable.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever a bay's row in the overview changes.
pub struct BayChangedEvent(pub BayView);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a player is placed on a bay.
pub struct SessionStartedEvent {
    /// Newly created assignment.
    pub assignment_id: Uuid,
    /// Bay number the player was placed on.
    pub bay_number: u32,
    /// Player nickname.
    pub nickname: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a bucket handover is recorded.
pub struct DeliveryRecordedEvent {
    /// Assignment the buckets were delivered against.
    pub assignment_id: Uuid,
    /// Bay number for display.
    pub bay_number: u32,
    /// Buckets in this handover.
    pub bucket_count: u32,
    /// Running bucket total for the assignment.
    pub total_balls: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when an assignment is closed, whatever triggered it.
pub struct SessionEndedEvent {
    /// The closed assignment.
    pub assignment_id: Uuid,
    /// Bay number the assignment was holding.
    pub bay_number: u32,
    /// Close trigger: "manual", "timed_expiry", "override", or
    /// "reconciliation".
    pub reason: String,
}
