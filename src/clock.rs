//! Wall-clock abstraction so lifecycle rules can be exercised against
//! simulated time. Interval scheduling stays on `tokio::time`, which tests
//! pause and advance on their own.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current wall-clock instant.
    fn now(&self) -> SystemTime;
}

/// Production clock reading the operating system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually advanced clock for tests and demos.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn new(start: SystemTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.current.lock().expect("clock lock poisoned");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.current.lock().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + Duration::from_secs(90));
    }
}
