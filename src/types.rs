//! Core types for the signal bus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Position of a node in the signal chain.
///
/// Strictly increasing; uniquely identifies a node. The sentinel root of a
/// chain sits at sequence 0, so the first appended signal is `Sequence(1)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since Unix epoch, as supplied by a [`Clock`](crate::Clock).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Milliseconds elapsed between `earlier` and `self`, clamped at zero.
    pub fn millis_since(self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0).max(0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Identifier for an attached subscriber cursor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload carried by a terminal error signal.
///
/// Shared by every cursor that observes the terminal node, hence reference
/// counted rather than owned.
pub type ErrorPayload = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// One signal on the bus: a data item or the single terminal marker.
#[derive(Clone, Debug)]
pub enum Signal<T> {
    /// A data item.
    Item(T),
    /// Normal termination of the sequence.
    Complete,
    /// Abnormal termination carrying an error payload.
    Error(ErrorPayload),
}

impl<T> Signal<T> {
    /// Whether this signal terminates the sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Item(_))
    }

    /// The item payload, if this is a data signal.
    pub fn item(&self) -> Option<&T> {
        match self {
            Signal::Item(value) => Some(value),
            _ => None,
        }
    }
}
