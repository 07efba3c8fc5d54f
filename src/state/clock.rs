//! Wall-clock abstraction so TTL and inactivity logic can run against simulated time.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time according to this clock.
    fn now(&self) -> SystemTime;
}

/// Shared handle to a clock implementation.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock used by tests to simulate elapsed time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|err| err.into_inner());
        *guard += delta;
    }

    /// Jump to an absolute point in time.
    pub fn set(&self, value: SystemTime) {
        let mut guard = self.now.lock().unwrap_or_else(|err| err.into_inner());
        *guard = value;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Milliseconds elapsed between `earlier` and `later`, saturating at zero.
pub fn elapsed_between(earlier: SystemTime, later: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::from_secs(5));
        assert_eq!(elapsed_between(start, clock.now()), Duration::from_secs(5));
    }

    #[test]
    fn elapsed_saturates_when_reversed() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.set(start - Duration::from_secs(10));
        assert_eq!(elapsed_between(start, clock.now()), Duration::ZERO);
    }
}
