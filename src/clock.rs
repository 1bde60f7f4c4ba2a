//! Clock abstraction used to timestamp appended signals.
//!
//! The bus reads the clock only when a signal is appended, when the sequence
//! terminates, and when a subscriber attaches. Nothing polls it on a timer, so
//! a time-bounded buffer that receives no traffic keeps serving its last-known
//! window until the next triggering event re-evaluates it.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of timestamps for age-based eviction.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Wall clock; the default when none is supplied at construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_millis() as i64)
    }
}

/// Manually driven clock for deterministic tests and virtual-time embedders.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.0),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.0, Ordering::SeqCst);
    }

    /// Advance by `millis`.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Timestamp(100));
        assert_eq!(clock.now(), Timestamp(100));

        clock.advance(5);
        assert_eq!(clock.now(), Timestamp(105));

        clock.set(Timestamp(42));
        assert_eq!(clock.now(), Timestamp(42));
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
