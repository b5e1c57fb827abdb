use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{BayStatus, SessionKind},
    dto::format_system_time,
};

/// Compact player projection carried inside a bay view.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Identifier of the player record.
    pub player_id: Uuid,
    /// Display name shown on the boards.
    pub nickname: String,
    /// Receipt number from the cashier desk.
    pub receipt_number: String,
}

/// One bay's row in the overview snapshot shared by every staff role.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BayView {
    /// Identifier of the bay.
    pub bay_id: Uuid,
    /// Human-facing bay number.
    pub bay_number: u32,
    /// Effective status: `Occupied` whenever an open assignment exists,
    /// otherwise the stored status.
    pub status: BayStatus,
    /// Status as stored, before occupancy is folded in.
    pub stored_status: BayStatus,
    /// Open assignment currently holding the bay, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<Uuid>,
    /// Player on the bay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerSummary>,
    /// Timed or open session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_kind: Option<SessionKind>,
    /// When the player was placed (RFC3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_time: Option<String>,
    /// Effective session start, set by the first delivery (RFC3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Planned end for timed sessions (RFC3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_end_time: Option<String>,
    /// Label attached to a reservation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_label: Option<String>,
    /// Total buckets delivered against the open assignment.
    pub total_balls: u64,
    /// Number of ledger entries for the open assignment.
    pub transactions_count: usize,
    /// True when a timed session ran past its planned end and awaits the
    /// closing touch or sweep.
    pub expired: bool,
}

/// Facility-wide counters derived from the bay rows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OverviewSummary {
    /// Size of the fixed pool.
    pub total_bays: usize,
    /// Bays with an open assignment.
    pub occupied_bays: usize,
    /// Bays locked for maintenance.
    pub maintenance_bays: usize,
    /// Bays held back by a reservation.
    pub reserved_bays: usize,
    /// Bays ready for the next player.
    pub available_bays: usize,
    /// "Bay Ready" when a bay is free, else the earliest planned end among
    /// open timed sessions (RFC3339), absent when neither applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_free: Option<String>,
}

/// Full snapshot response for polling or reconnecting observers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OverviewResponse {
    /// When the snapshot was computed (RFC3339).
    pub generated_at: String,
    /// Facility counters.
    pub summary: OverviewSummary,
    /// One row per bay, ordered by bay number.
    pub bays: Vec<BayView>,
}

impl OverviewResponse {
    /// Assemble a snapshot response, stamping the generation time.
    pub fn new(generated_at: SystemTime, summary: OverviewSummary, bays: Vec<BayView>) -> Self {
        Self {
            generated_at: format_system_time(generated_at),
            summary,
            bays,
        }
    }
}
