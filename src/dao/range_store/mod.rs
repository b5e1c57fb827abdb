pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{AssignmentEntity, BallTransactionEntity, BayEntity, BayStatus, PlayerEntity};
use crate::dao::storage::StorageResult;

/// Outcome of a guarded close on an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The assignment was open and has now been closed.
    Closed {
        /// Bay the assignment was holding.
        bay_id: Uuid,
        /// Player whose `end_time` was stamped alongside the close.
        player_id: Uuid,
    },
    /// The assignment was already closed; nothing changed.
    AlreadyClosed,
}

/// Reservation metadata stamped onto a bay entering `Reserved`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationStamp {
    /// When the reservation was placed.
    pub reserved_at: SystemTime,
    /// Optional staff-supplied label.
    pub label: Option<String>,
}

/// Abstraction over the persistence layer for bays, assignments, players,
/// and the ball-transaction ledger.
///
/// The compound operations (`create_session`, `close_session`,
/// `append_transaction`, `set_player_start_time`, `set_bay_status`,
/// `release_bay_if_idle`) are conditional read-then-write steps the backend
/// must apply atomically: a failed precondition surfaces as
/// [`StorageError::Conflict`](crate::dao::storage::StorageError) or a
/// `false`/`AlreadyClosed` result, never as a partial write.
pub trait RangeStore: Send + Sync {
    /// Insert bays numbered `1..=count` that do not exist yet. Returns how
    /// many were created. Existing bays are left untouched.
    fn seed_bays(&self, count: u32) -> BoxFuture<'static, StorageResult<usize>>;

    /// All bays ordered by bay number.
    fn list_bays(&self) -> BoxFuture<'static, StorageResult<Vec<BayEntity>>>;

    /// Fetch a single bay.
    fn find_bay(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BayEntity>>>;

    /// Fetch a single assignment.
    fn find_assignment(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentEntity>>>;

    /// Fetch a single player.
    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;

    /// Every assignment whose open flag is still set.
    fn open_assignments(&self) -> BoxFuture<'static, StorageResult<Vec<AssignmentEntity>>>;

    /// The open assignment currently holding the given bay, if any.
    fn open_assignment_for_bay(
        &self,
        bay_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentEntity>>>;

    /// Ledger entries for one assignment, in delivery order.
    fn transactions_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<BallTransactionEntity>>>;

    /// Atomically claim the assignment's bay and persist the player and
    /// assignment rows. The claim succeeds only while the bay status is
    /// `Available` and it has no open assignment; otherwise the whole
    /// operation fails with a conflict and nothing is written.
    fn create_session(
        &self,
        player: PlayerEntity,
        assignment: AssignmentEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Clear the assignment's open flag and stamp assignment and player end
    /// times, guarded on the flag still being set.
    fn close_session(
        &self,
        assignment_id: Uuid,
        end_time: SystemTime,
    ) -> BoxFuture<'static, StorageResult<CloseOutcome>>;

    /// Append a ledger entry, guarded on the assignment still being open.
    fn append_transaction(
        &self,
        transaction: BallTransactionEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Set the player's start time only when it is currently unset. Returns
    /// whether this call performed the write.
    fn set_player_start_time(
        &self,
        player_id: Uuid,
        start_time: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Compare-and-swap the bay status: the write happens only when the
    /// current status is one of `expected`. A `reservation` stamp is stored
    /// when moving into `Reserved`; reservation fields are cleared
    /// otherwise. Returns whether the swap happened.
    fn set_bay_status(
        &self,
        bay_id: Uuid,
        expected: Vec<BayStatus>,
        next: BayStatus,
        reservation: Option<ReservationStamp>,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Flip an `Occupied` bay back to `Available` only when no open
    /// assignment remains for it. Returns whether the flip happened.
    fn release_bay_if_idle(&self, bay_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Cheap liveness probe against the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Attempt to re-establish a dropped backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
