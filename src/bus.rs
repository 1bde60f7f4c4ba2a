//! Replay-buffered multicast bus: the processor facade over the signal log.

use crate::clock::{Clock, SystemClock};
use crate::cursor::{Cursor, SignalObserver, SubscriptionHandle};
use crate::error::Result;
use crate::log::ReplayLog;
use crate::policy::EvictionPolicy;
use crate::types::{ErrorPayload, Sequence, SubscriberId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The capability contract shared by every processor variant: append signals,
/// terminate exactly once, attach subscribers.
pub trait SignalBus<T>: Send + Sync {
    /// Append a data item. Rejected once the bus is terminated.
    fn emit(&self, value: T) -> Result<Sequence>;

    /// Terminate normally. Rejected if already terminated.
    fn complete(&self) -> Result<()>;

    /// Terminate with an error payload. Rejected if already terminated.
    fn fail(&self, error: ErrorPayload) -> Result<()>;

    /// Whether the terminal signal has been appended.
    fn is_terminated(&self) -> bool;

    /// Attach a subscriber; it replays the currently offered window, then
    /// receives every future signal, driven by its own demand.
    fn subscribe<S>(&self, observer: S) -> SubscriptionHandle<T>
    where
        S: SignalObserver<T> + 'static;
}

pub(crate) struct BusInner<T> {
    log: ReplayLog<T>,
    cursors: RwLock<HashMap<SubscriberId, Arc<Cursor<T>>>>,
    next_id: AtomicU64,
}

impl<T> BusInner<T> {
    pub(crate) fn remove(&self, id: SubscriberId) {
        self.cursors.write().remove(&id);
    }

    /// Re-drain every registered cursor after the chain grew.
    ///
    /// Cursors are cloned out first: a drain that reaches the terminal node
    /// detaches itself, which needs the registry write lock.
    fn notify(&self) {
        let cursors: Vec<_> = self.cursors.read().values().cloned().collect();
        for cursor in cursors {
            cursor.drain();
        }
    }
}

/// A multicast signal bus that retains a bounded window of history and
/// replays it to late subscribers.
///
/// One logical writer appends; any number of subscribers attach at any time,
/// each observing the retained window plus all future signals in order, with
/// no gaps and no duplicates. Cheap to clone; clones share the same log.
pub struct ReplayBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for ReplayBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> ReplayBus<T> {
    /// Start configuring a bus.
    pub fn builder() -> ReplayBusBuilder<T> {
        ReplayBusBuilder::new()
    }

    /// Bus retaining the full history.
    pub fn unbounded() -> Self {
        Self::builder().build()
    }

    /// Bus retaining the last `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Number of data items currently offered to a new subscriber, before
    /// the age bound is re-evaluated.
    pub fn retained_len(&self) -> usize {
        self.inner.log.retained_len()
    }

    /// Number of attached, non-terminal subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.cursors.read().len()
    }
}

impl<T: Send + Sync + 'static> SignalBus<T> for ReplayBus<T> {
    fn emit(&self, value: T) -> Result<Sequence> {
        let node = self.inner.log.append(value)?;
        self.inner.notify();
        Ok(node.seq)
    }

    fn complete(&self) -> Result<()> {
        self.inner.log.complete()?;
        self.inner.notify();
        Ok(())
    }

    fn fail(&self, error: ErrorPayload) -> Result<()> {
        self.inner.log.fail(error)?;
        self.inner.notify();
        Ok(())
    }

    fn is_terminated(&self) -> bool {
        self.inner.log.is_terminated()
    }

    fn subscribe<S>(&self, observer: S) -> SubscriptionHandle<T>
    where
        S: SignalObserver<T> + 'static,
    {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let start = self.inner.log.snapshot_head();
        tracing::debug!(id = %id, start = %start.seq, "subscriber attached");
        let cursor = Arc::new(Cursor::new(
            id,
            Box::new(observer),
            start,
            Arc::downgrade(&self.inner),
        ));
        self.inner.cursors.write().insert(id, cursor.clone());
        SubscriptionHandle::new(cursor)
    }
}

/// Builder selecting eviction policy, optional default seed, and clock.
pub struct ReplayBusBuilder<T> {
    policy: EvictionPolicy,
    clock: Option<Arc<dyn Clock>>,
    seed: Option<T>,
}

impl<T: Send + Sync + 'static> ReplayBusBuilder<T> {
    fn new() -> Self {
        Self {
            policy: EvictionPolicy::Unbounded,
            clock: None,
            seed: None,
        }
    }

    /// Retain at most `capacity` items (combined with any age bound already
    /// configured). Must be at least 1.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.policy = match self.policy.max_age() {
            Some(max_age) => EvictionPolicy::SizeAndTimeLimited { capacity, max_age },
            None => EvictionPolicy::SizeLimited { capacity },
        };
        self
    }

    /// Retain items strictly younger than `max_age` (combined with any size
    /// bound already configured).
    pub fn max_age(mut self, max_age: std::time::Duration) -> Self {
        self.policy = match self.policy.capacity() {
            Some(capacity) => EvictionPolicy::SizeAndTimeLimited { capacity, max_age },
            None => EvictionPolicy::TimeLimited { max_age },
        };
        self
    }

    /// Replace the policy wholesale.
    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seed the bus with a synthetic default value, delivered to subscribers
    /// attaching before any real item arrives. Dropped by the first `emit`.
    pub fn default_value(mut self, value: T) -> Self {
        self.seed = Some(value);
        self
    }

    /// Supply the clock used to timestamp signals. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the bus.
    ///
    /// # Panics
    ///
    /// Panics if a size bound of zero was configured.
    pub fn build(self) -> ReplayBus<T> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        ReplayBus {
            inner: Arc::new(BusInner {
                log: ReplayLog::new(self.policy, clock, self.seed),
                cursors: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::BusError;
    use crate::types::Timestamp;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect {
        items: Mutex<Vec<u32>>,
        completed: AtomicBool,
    }

    impl SignalObserver<u32> for Arc<Collect> {
        fn on_item(&self, value: &u32) {
            self.items.lock().push(*value);
        }

        fn on_complete(&self) {
            self.completed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_late_subscriber_replays_window() {
        let bus = ReplayBus::with_capacity(2);
        for i in 1..=4 {
            bus.emit(i).unwrap();
        }

        let collect = Arc::new(Collect::default());
        let handle = bus.subscribe(collect.clone());
        handle.request(u64::MAX).unwrap();
        assert_eq!(*collect.items.lock(), vec![3, 4]);

        // Live delivery continues past the replayed window.
        bus.emit(5).unwrap();
        assert_eq!(*collect.items.lock(), vec![3, 4, 5]);
    }

    #[test]
    fn test_subscribers_are_independent() {
        let bus = ReplayBus::unbounded();
        bus.emit(1).unwrap();
        bus.emit(2).unwrap();

        let fast = Arc::new(Collect::default());
        let slow = Arc::new(Collect::default());
        let fast_handle = bus.subscribe(fast.clone());
        let slow_handle = bus.subscribe(slow.clone());

        fast_handle.request(10).unwrap();
        slow_handle.request(1).unwrap();

        assert_eq!(*fast.items.lock(), vec![1, 2]);
        assert_eq!(*slow.items.lock(), vec![1]);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_terminal_detaches_subscribers() {
        let bus = ReplayBus::unbounded();
        let collect = Arc::new(Collect::default());
        let handle = bus.subscribe(collect.clone());
        handle.request(u64::MAX).unwrap();

        bus.emit(1).unwrap();
        bus.complete().unwrap();

        assert!(collect.completed.load(Ordering::SeqCst));
        assert!(handle.is_closed());
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.is_terminated());
    }

    #[test]
    fn test_emit_after_terminal_rejected() {
        let bus = ReplayBus::unbounded();
        bus.emit(1).unwrap();
        bus.complete().unwrap();

        assert_eq!(bus.emit(2).unwrap_err(), BusError::Terminated);
        assert_eq!(bus.complete().unwrap_err(), BusError::Terminated);
        assert_eq!(bus.retained_len(), 1);
    }

    #[test]
    fn test_default_seed_until_first_emit() {
        let bus = ReplayBus::builder().default_value(99).build();

        let early = Arc::new(Collect::default());
        bus.subscribe(early.clone()).request(10).unwrap();
        assert_eq!(*early.items.lock(), vec![99]);

        bus.emit(1).unwrap();
        let late = Arc::new(Collect::default());
        bus.subscribe(late.clone()).request(10).unwrap();
        assert_eq!(*late.items.lock(), vec![1]);

        // The early subscriber saw the seed and then the real item.
        assert_eq!(*early.items.lock(), vec![99, 1]);
    }

    #[test]
    fn test_manual_clock_drives_age_eviction() {
        let clock = Arc::new(ManualClock::new(Timestamp(0)));
        let bus = ReplayBus::builder()
            .max_age(Duration::from_millis(5))
            .clock(clock.clone())
            .build();
        bus.emit(1).unwrap();

        clock.set(Timestamp(4));
        let fresh = Arc::new(Collect::default());
        bus.subscribe(fresh.clone()).request(10).unwrap();
        assert_eq!(*fresh.items.lock(), vec![1]);

        clock.set(Timestamp(5));
        let aged = Arc::new(Collect::default());
        bus.subscribe(aged.clone()).request(10).unwrap();
        assert!(aged.items.lock().is_empty());
    }

    #[test]
    fn test_builder_combines_capacity_and_age() {
        let bus: ReplayBus<u32> = ReplayBus::builder()
            .capacity(8)
            .max_age(Duration::from_secs(1))
            .build();
        assert_eq!(bus.retained_len(), 0);

        // Same policy regardless of the order the bounds are set in.
        let _reversed: ReplayBus<u32> = ReplayBus::builder()
            .max_age(Duration::from_secs(1))
            .capacity(8)
            .build();
    }

    #[test]
    fn test_clones_share_the_log() {
        let bus = ReplayBus::unbounded();
        let producer = bus.clone();
        producer.emit(7).unwrap();

        let collect = Arc::new(Collect::default());
        bus.subscribe(collect.clone()).request(1).unwrap();
        assert_eq!(*collect.items.lock(), vec![7]);
    }
}
