use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::SessionKind,
    dto::{overview::BayView, validation::validate_receipt_number},
};

/// Payload placing a player on a bay.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// Display name for the player.
    pub nickname: String,
    /// Receipt number from the desk; generated when omitted.
    #[serde(default)]
    pub receipt_number: Option<String>,
    /// Agreed hourly rate, recorded for the cashier tooling.
    #[serde(default)]
    pub price_per_hour: Option<f64>,
    /// Staff member placing the player.
    pub dispatcher_id: Uuid,
    /// Timed or open session.
    pub kind: SessionKind,
    /// Planned duration in minutes. Required for timed sessions, ignored
    /// for open ones.
    #[serde(default)]
    pub planned_minutes: Option<u64>,
}

impl Validate for StartSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.nickname.trim().is_empty() {
            let mut err = validator::ValidationError::new("nickname_empty");
            err.message = Some("nickname must not be empty".into());
            errors.add("nickname", err);
        }

        if let Some(ref receipt) = self.receipt_number {
            if let Err(e) = validate_receipt_number(receipt) {
                errors.add("receipt_number", e);
            }
        }

        if let Some(price) = self.price_per_hour {
            if !(price.is_finite() && price >= 0.0) {
                let mut err = validator::ValidationError::new("price_negative");
                err.message = Some("price per hour must be a non-negative number".into());
                errors.add("price_per_hour", err);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Identifiers returned once a session has been created.
#[derive(Debug, Serialize, ToSchema)]
pub struct StartSessionResponse {
    /// Newly created assignment.
    pub assignment_id: Uuid,
    /// Player occupying the bay.
    pub player_id: Uuid,
    /// Bay number for display.
    pub bay_number: u32,
}

/// Payload recording a bucket handover.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct DeliveryRequest {
    /// Ball-handler making the delivery.
    pub handler_id: Uuid,
    /// Buckets handed over; must be strictly positive.
    #[validate(range(min = 1, message = "bucket count must be strictly positive"))]
    pub bucket_count: u32,
}

/// Receipt for a recorded delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryResponse {
    /// Ledger entry created for this handover.
    pub transaction_id: Uuid,
    /// Session start time (RFC3339) when this delivery was the one that
    /// started the clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_started_at: Option<String>,
}

/// Acknowledgement for an end-session call.
#[derive(Debug, Serialize, ToSchema)]
pub struct EndSessionResponse {
    /// Assignment the call targeted.
    pub assignment_id: Uuid,
    /// False when the assignment was already closed and the call was a
    /// no-op.
    pub was_open: bool,
}

/// Administrative override actions on a bay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    /// Close the bay's open assignment, if any.
    EndSession,
    /// Lock the bay for maintenance, closing any open assignment first.
    Lock,
    /// Clear a maintenance lock.
    Unlock,
    /// Hold the bay back from auto-assignment, closing any open assignment.
    Reserve,
    /// Clear a reservation.
    Unreserve,
}

/// Payload for the bay override endpoint.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct OverrideRequest {
    /// Which override to perform.
    pub action: OverrideAction,
    /// Optional label stored with a reservation.
    #[serde(default)]
    #[validate(length(max = 120, message = "label is limited to 120 characters"))]
    pub label: Option<String>,
}

/// Refreshed bay row returned after an override.
#[derive(Debug, Serialize, ToSchema)]
pub struct OverrideResponse {
    /// The bay after the override was applied.
    pub bay: BayView,
}
