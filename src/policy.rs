//! Eviction policies bounding the replay window.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decides which prefix of retained history is still offered to newly
/// attaching subscribers.
///
/// Eviction only moves the offer point forward; it never detaches nodes that
/// an already-attached cursor may still be walking through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Retain the full history.
    Unbounded,
    /// Retain at most `capacity` data items.
    SizeLimited { capacity: usize },
    /// Retain items strictly younger than `max_age`.
    TimeLimited { max_age: Duration },
    /// Retain at most `capacity` items strictly younger than `max_age`;
    /// an item violating either bound is evicted.
    SizeAndTimeLimited { capacity: usize, max_age: Duration },
}

impl EvictionPolicy {
    /// Item-count bound, if this policy has one.
    pub fn capacity(&self) -> Option<usize> {
        match *self {
            EvictionPolicy::SizeLimited { capacity }
            | EvictionPolicy::SizeAndTimeLimited { capacity, .. } => Some(capacity),
            _ => None,
        }
    }

    /// Age bound, if this policy has one.
    pub fn max_age(&self) -> Option<Duration> {
        match *self {
            EvictionPolicy::TimeLimited { max_age }
            | EvictionPolicy::SizeAndTimeLimited { max_age, .. } => Some(max_age),
            _ => None,
        }
    }

    /// Whether an item of the given age has aged out.
    ///
    /// Strict bound: age exactly equal to `max_age` is evicted, age strictly
    /// less is retained, so an item is always visible at the instant it
    /// arrives.
    pub(crate) fn expired(&self, age_millis: i64) -> bool {
        match self.max_age() {
            Some(max_age) => age_millis >= max_age.as_millis() as i64,
            None => false,
        }
    }

    pub(crate) fn validate(&self) {
        if let Some(capacity) = self.capacity() {
            assert!(capacity > 0, "replay capacity must be at least 1");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_accessor() {
        assert_eq!(EvictionPolicy::Unbounded.capacity(), None);
        assert_eq!(
            EvictionPolicy::SizeLimited { capacity: 8 }.capacity(),
            Some(8)
        );
        assert_eq!(
            EvictionPolicy::SizeAndTimeLimited {
                capacity: 8,
                max_age: Duration::from_millis(5),
            }
            .capacity(),
            Some(8)
        );
    }

    #[test]
    fn test_age_bound_is_strict() {
        let policy = EvictionPolicy::TimeLimited {
            max_age: Duration::from_millis(5),
        };
        assert!(!policy.expired(0));
        assert!(!policy.expired(4));
        assert!(policy.expired(5));
        assert!(policy.expired(6));
    }

    #[test]
    fn test_unbounded_never_expires() {
        assert!(!EvictionPolicy::Unbounded.expired(i64::MAX));
    }

    #[test]
    #[should_panic(expected = "replay capacity must be at least 1")]
    fn test_zero_capacity_rejected() {
        EvictionPolicy::SizeLimited { capacity: 0 }.validate();
    }
}
