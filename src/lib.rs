//! # Replay Bus
//!
//! Retention and replay core for a multicast signal bus: one logical producer
//! appends a sequence of typed items terminated by exactly one
//! completion-or-error signal, while any number of subscribers attach at
//! arbitrary times and each observes the retained window plus every future
//! signal, in order, with no gaps and no duplicates.
//!
//! ## Core Concepts
//!
//! - **Signal log**: append-only chain of immutable, write-once-linked nodes
//! - **Eviction policy**: unbounded, size-, age-, or size-and-age-bounded
//!   retention; decides what a newly attaching subscriber may replay
//! - **Cursors**: independent per-subscriber positions with demand-based
//!   (pull) delivery
//! - **Emission gate**: serializes concurrent producers into one logical
//!   writer without blocking them
//!
//! ## Example
//!
//! ```ignore
//! use replay_bus::{ReplayBus, Signal, SignalBus};
//!
//! let bus = ReplayBus::with_capacity(16);
//! bus.emit("early")?;
//!
//! // A late subscriber replays the retained window, then goes live.
//! let mut stream = bus.stream();
//! bus.emit("live")?;
//! bus.complete()?;
//!
//! assert!(matches!(stream.recv(), Some(Signal::Item("early"))));
//! assert!(matches!(stream.recv(), Some(Signal::Item("live"))));
//! assert!(matches!(stream.recv(), Some(Signal::Complete)));
//! ```

pub mod bus;
pub mod clock;
pub mod cursor;
pub mod error;
pub mod gate;
mod log;
pub mod policy;
pub mod stream;
pub mod types;

// Re-exports
pub use bus::{ReplayBus, ReplayBusBuilder, SignalBus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cursor::{SignalObserver, SubscriptionHandle};
pub use error::{BusError, Result};
pub use gate::EmissionGate;
pub use policy::EvictionPolicy;
pub use stream::EventStream;
pub use types::{ErrorPayload, Sequence, Signal, SubscriberId, Timestamp};
