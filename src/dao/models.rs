use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a physical bay.
///
/// Serialized as the plain variant name so it matches the values staff tools
/// already display ("Available", "Occupied", "Reserved", "Maintenance").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum BayStatus {
    /// Bay is free and may be assigned to a player.
    Available,
    /// Bay currently holds an open assignment.
    Occupied,
    /// Bay is held back from auto-assignment by staff.
    Reserved,
    /// Bay is locked for maintenance work.
    Maintenance,
}

/// Whether a session has a pre-agreed end time or runs until closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SessionKind {
    /// Session with no fixed end time, closed only by explicit action.
    Open,
    /// Session with a planned end time agreed up front.
    Timed,
}

/// Why an assignment was closed. Logged for auditing; not persisted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Staff ended the session from the dispatcher or cashier view.
    Manual,
    /// A timed session ran past its planned end time.
    TimedExpiry,
    /// An administrative override (lock/reserve/end) cascaded into the close.
    Override,
    /// The reconciliation sweep closed a dangling assignment.
    Reconciliation,
}

/// A physical hitting station. The pool is fixed at facility setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayEntity {
    /// Stable identifier for the bay.
    pub id: Uuid,
    /// Human-facing bay number painted on the station.
    pub bay_number: u32,
    /// Stored status, mutated only through guarded transitions.
    pub status: BayStatus,
    /// When the bay entered `Reserved`, used for reservation expiry.
    pub reserved_at: Option<SystemTime>,
    /// Optional staff-supplied label attached to a reservation.
    pub reserved_label: Option<String>,
}

impl BayEntity {
    /// Build a fresh available bay for the fixed pool.
    pub fn new(bay_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            bay_number,
            status: BayStatus::Available,
            reserved_at: None,
            reserved_label: None,
        }
    }
}

/// Binds a player to a bay for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentEntity {
    /// Stable identifier for the assignment.
    pub id: Uuid,
    /// Bay this assignment holds while open.
    pub bay_id: Uuid,
    /// Player occupying the bay.
    pub player_id: Uuid,
    /// Staff member who placed the player.
    pub dispatcher_id: Uuid,
    /// When the player was placed on the bay.
    pub assigned_time: SystemTime,
    /// When the assignment was closed. Unset while open.
    pub end_time: Option<SystemTime>,
    /// Planned end time, present for timed sessions only.
    pub planned_end_time: Option<SystemTime>,
    /// Timed or open session.
    pub kind: SessionKind,
    /// True while this assignment holds its bay. Authoritative for
    /// occupancy; the timestamps are informational.
    pub open: bool,
}

impl AssignmentEntity {
    /// Whether this assignment is a timed session that ran past its planned
    /// end. Expiry is a derived predicate; the stored row is untouched until
    /// the next mutating call or sweep closes it.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.open
            && self.kind == SessionKind::Timed
            && self.planned_end_time.is_some_and(|planned| planned <= now)
    }
}

/// One paying player for one session window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntity {
    /// Stable identifier for the player record.
    pub id: Uuid,
    /// Display name used on the overview boards.
    pub nickname: String,
    /// Receipt number handed out at the cashier desk.
    pub receipt_number: String,
    /// Hourly rate agreed at the desk; billing math happens elsewhere.
    pub price_per_hour: Option<f64>,
    /// Set exactly once by the first ball delivery, never at assignment
    /// creation. Unset means the session never started.
    pub start_time: Option<SystemTime>,
    /// Set when the assignment is closed.
    pub end_time: Option<SystemTime>,
    /// Staff member who created the record.
    pub created_by: Uuid,
}

/// Append-only ledger entry for a bucket handover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallTransactionEntity {
    /// Stable identifier for the transaction.
    pub id: Uuid,
    /// Assignment the buckets were delivered against.
    pub assignment_id: Uuid,
    /// Ball-handler who made the delivery.
    pub handler_id: Uuid,
    /// Number of buckets handed over, strictly positive.
    pub bucket_count: u32,
    /// When the handover happened.
    pub delivered_time: SystemTime,
}
