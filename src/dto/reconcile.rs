use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One dangling assignment found by the sweep.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileAssignment {
    /// Assignment that was (or would be) closed.
    pub assignment_id: Uuid,
    /// Player holding it.
    pub player_id: Uuid,
    /// Player nickname when the record could be loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// When the player was placed (RFC3339).
    pub assigned_time: String,
    /// True when apply mode actually closed this assignment.
    pub closed: bool,
}

/// Open assignments found on one bay.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileBayReport {
    /// Bay the assignments belong to.
    pub bay_id: Uuid,
    /// Human-facing bay number.
    pub bay_number: u32,
    /// The dangling assignments, oldest first.
    pub assignments: Vec<ReconcileAssignment>,
}

/// Result of a reconciliation pass, grouped by bay for operator review.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileReport {
    /// When the sweep started (RFC3339).
    pub swept_at: String,
    /// Whether changes were applied or this was a dry run.
    pub applied: bool,
    /// Total open assignments found.
    pub total_open: usize,
    /// Findings grouped by bay, ordered by bay number.
    pub bays: Vec<ReconcileBayReport>,
}
