//! Session timing rules.

use std::time::{Duration, SystemTime};

/// Fixed grace period between a bucket leaving the counter and reaching the
/// player's bay. The clock starts ticking once the balls are in hand.
pub const DELIVERY_GRACE: Duration = Duration::from_secs(30);

/// Compute a session's effective start time from its first ball delivery.
///
/// Called exactly once per assignment, on the first recorded transaction and
/// only while the player's start time is unset. Later transactions must not
/// shift the start; the guarded store update enforces that.
pub fn resolve_start_time(first_delivery: SystemTime) -> SystemTime {
    first_delivery + DELIVERY_GRACE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_time_is_delivery_plus_grace() {
        let delivered = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            resolve_start_time(delivered),
            delivered + Duration::from_secs(30)
        );
    }
}
