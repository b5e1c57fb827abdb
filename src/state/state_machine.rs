use thiserror::Error;

use crate::dao::models::BayStatus;

/// Events that can be applied to a bay's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayEvent {
    /// A player is placed on the bay.
    Assign,
    /// The bay's open assignment was closed and no other remains.
    Release,
    /// Staff locks the bay for maintenance.
    Lock,
    /// Staff clears the maintenance lock.
    Unlock,
    /// Staff holds the bay back from auto-assignment.
    Reserve,
    /// Staff clears a reservation.
    Unreserve,
}

/// Result of computing a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changes to the contained value.
    Changed(BayStatus),
    /// The bay is already in the target state; nothing to write.
    Noop,
}

/// Error returned when an event cannot be applied to the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while bay is {from:?}")]
pub struct InvalidTransition {
    /// Status the bay was in when the invalid event was received.
    pub from: BayStatus,
    /// The event that cannot be applied from this status.
    pub event: BayEvent,
}

/// Compute the status a bay moves to when `event` is applied.
///
/// Requests that would land on the status the bay is already in come back as
/// [`Transition::Noop`] so repeated staff clicks succeed without a write.
/// `Release` additionally no-ops from every non-occupied status: closing an
/// assignment on a locked or reserved bay must not put it back in rotation.
pub fn compute_transition(
    current: BayStatus,
    event: BayEvent,
) -> Result<Transition, InvalidTransition> {
    use BayStatus::*;

    let next = match (current, event) {
        (Available, BayEvent::Assign) => Occupied,
        (Occupied, BayEvent::Release) => Available,
        (Available | Reserved | Maintenance, BayEvent::Release) => return Ok(Transition::Noop),
        (Available | Occupied, BayEvent::Lock) => Maintenance,
        (Maintenance, BayEvent::Lock) => return Ok(Transition::Noop),
        (Maintenance, BayEvent::Unlock) => Available,
        (Available, BayEvent::Unlock) => return Ok(Transition::Noop),
        (Available | Occupied, BayEvent::Reserve) => Reserved,
        (Reserved, BayEvent::Reserve) => return Ok(Transition::Noop),
        (Reserved, BayEvent::Unreserve) => Available,
        (Available, BayEvent::Unreserve) => return Ok(Transition::Noop),
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(Transition::Changed(next))
}

/// Statuses from which the event may legally start, for use as the expected
/// set of a conditional store update. Noop sources are excluded: they need
/// no write at all.
pub fn expected_sources(event: BayEvent) -> Vec<BayStatus> {
    use BayStatus::*;

    match event {
        BayEvent::Assign => vec![Available],
        BayEvent::Release => vec![Occupied],
        BayEvent::Lock => vec![Available, Occupied],
        BayEvent::Unlock => vec![Maintenance],
        BayEvent::Reserve => vec![Available, Occupied],
        BayEvent::Unreserve => vec![Reserved],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(current: BayStatus, event: BayEvent) -> BayStatus {
        match compute_transition(current, event).unwrap() {
            Transition::Changed(next) => next,
            Transition::Noop => panic!("expected a status change from {current:?} on {event:?}"),
        }
    }

    #[test]
    fn assignment_occupies_and_release_frees() {
        assert_eq!(changed(BayStatus::Available, BayEvent::Assign), BayStatus::Occupied);
        assert_eq!(changed(BayStatus::Occupied, BayEvent::Release), BayStatus::Available);
    }

    #[test]
    fn assign_rejected_unless_available() {
        for status in [BayStatus::Occupied, BayStatus::Reserved, BayStatus::Maintenance] {
            let err = compute_transition(status, BayEvent::Assign).unwrap_err();
            assert_eq!(err.from, status);
            assert_eq!(err.event, BayEvent::Assign);
        }
    }

    #[test]
    fn release_never_unlocks_or_unreserves() {
        assert_eq!(
            compute_transition(BayStatus::Maintenance, BayEvent::Release).unwrap(),
            Transition::Noop
        );
        assert_eq!(
            compute_transition(BayStatus::Reserved, BayEvent::Release).unwrap(),
            Transition::Noop
        );
    }

    #[test]
    fn lock_covers_available_and_occupied() {
        assert_eq!(changed(BayStatus::Available, BayEvent::Lock), BayStatus::Maintenance);
        assert_eq!(changed(BayStatus::Occupied, BayEvent::Lock), BayStatus::Maintenance);
        assert_eq!(
            compute_transition(BayStatus::Maintenance, BayEvent::Lock).unwrap(),
            Transition::Noop
        );
    }

    #[test]
    fn reserved_bays_must_be_cleared_before_locking() {
        let err = compute_transition(BayStatus::Reserved, BayEvent::Lock).unwrap_err();
        assert_eq!(err.from, BayStatus::Reserved);
    }

    #[test]
    fn repeated_requests_are_noops() {
        assert_eq!(
            compute_transition(BayStatus::Reserved, BayEvent::Reserve).unwrap(),
            Transition::Noop
        );
        assert_eq!(
            compute_transition(BayStatus::Available, BayEvent::Unlock).unwrap(),
            Transition::Noop
        );
        assert_eq!(
            compute_transition(BayStatus::Available, BayEvent::Unreserve).unwrap(),
            Transition::Noop
        );
    }

    #[test]
    fn unlock_requires_maintenance_or_target_state() {
        let err = compute_transition(BayStatus::Occupied, BayEvent::Unlock).unwrap_err();
        assert_eq!(err.event, BayEvent::Unlock);
        assert_eq!(changed(BayStatus::Maintenance, BayEvent::Unlock), BayStatus::Available);
    }
}
