//! Per-subscriber pull cursors and the drain protocol.
//!
//! A cursor walks the signal chain from its subscribe-time snapshot toward
//! the tail, delivering one node per unit of outstanding demand. At most one
//! thread physically advances a cursor at a time: concurrent `request`,
//! `cancel`, and producer wakeups funnel through a missed-wakeup counter, and
//! whichever caller wins re-runs the delivery loop until every wakeup has
//! been observed.

use crate::bus::BusInner;
use crate::error::{BusError, Result};
use crate::log::{Entry, Node};
use crate::types::{ErrorPayload, SubscriberId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Receives the signals a cursor delivers.
///
/// Items are delivered by reference: the same retained node is replayed to
/// every subscriber, so observers clone what they need to keep.
pub trait SignalObserver<T>: Send + Sync {
    fn on_item(&self, value: &T);
    fn on_complete(&self) {}
    fn on_error(&self, _error: &ErrorPayload) {}
}

impl<T, S: SignalObserver<T> + ?Sized> SignalObserver<T> for Arc<S> {
    fn on_item(&self, value: &T) {
        (**self).on_item(value)
    }

    fn on_complete(&self) {
        (**self).on_complete()
    }

    fn on_error(&self, error: &ErrorPayload) {
        (**self).on_error(error)
    }
}

/// A subscriber's read position plus outstanding demand.
///
/// Lifecycle: attached (parked at the subscribe-time snapshot, zero demand),
/// draining/live (walking the chain, or parked at the tail with demand left),
/// then completed (terminal delivered) or cancelled. The terminal states
/// detach the cursor from the bus registry.
pub(crate) struct Cursor<T> {
    id: SubscriberId,
    observer: Box<dyn SignalObserver<T>>,
    bus: Weak<BusInner<T>>,
    /// Last node handed to the observer (initially the head snapshot, whose
    /// own entry was never delivered). Taken while a drain is advancing and
    /// dropped for good on completion or cancellation.
    position: Mutex<Option<Arc<Node<T>>>>,
    demand: AtomicU64,
    /// Missed-wakeup counter serializing drains.
    wip: AtomicU64,
    cancelled: AtomicBool,
    done: AtomicBool,
}

impl<T> Cursor<T> {
    pub fn new(
        id: SubscriberId,
        observer: Box<dyn SignalObserver<T>>,
        start: Arc<Node<T>>,
        bus: Weak<BusInner<T>>,
    ) -> Self {
        Self {
            id,
            observer,
            bus,
            position: Mutex::new(Some(start)),
            demand: AtomicU64::new(0),
            wip: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Add `n` to outstanding demand and attempt a drain.
    ///
    /// No-op on a completed or cancelled cursor; `n == 0` is rejected.
    pub fn request(&self, n: u64) -> Result<()> {
        if n == 0 {
            return Err(BusError::ZeroDemand);
        }
        if self.is_closed() {
            return Ok(());
        }
        let _ = self
            .demand
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |demand| {
                Some(demand.saturating_add(n))
            });
        self.drain();
        Ok(())
    }

    /// Stop delivery, including the terminal signal. Idempotent.
    pub fn cancel(&self) {
        if self.done.load(Ordering::Acquire) || self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(id = %self.id, "cancelled subscriber cursor");
        self.drain();
    }

    pub fn is_closed(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire)
    }

    /// Wake the cursor: become the active drainer or leave a wakeup for it.
    ///
    /// The winner keeps re-running the delivery loop until the counter says
    /// every concurrent wakeup (new demand, new tail, cancellation) has been
    /// seen, so none is lost and no second traversal ever starts.
    pub fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            self.drain_loop();
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if previous == missed {
                return;
            }
            missed = previous - missed;
        }
    }

    fn drain_loop(&self) {
        let mut node = match self.position.lock().take() {
            Some(node) => node,
            None => return,
        };
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.detach();
                return;
            }
            let next = match node.next() {
                Some(next) => next.clone(),
                None => break,
            };
            debug_assert_eq!(next.seq, node.seq.next(), "gap in signal chain");
            match &next.entry {
                Entry::Seed(value) | Entry::Item(value) => {
                    if self.demand.load(Ordering::Acquire) == 0 {
                        break;
                    }
                    self.observer.on_item(value);
                    self.demand.fetch_sub(1, Ordering::AcqRel);
                    node = next;
                }
                Entry::Complete => {
                    self.done.store(true, Ordering::Release);
                    self.observer.on_complete();
                    self.detach();
                    return;
                }
                Entry::Error(error) => {
                    self.done.store(true, Ordering::Release);
                    self.observer.on_error(error);
                    self.detach();
                    return;
                }
                Entry::Root => unreachable!("root node is never linked as a successor"),
            }
        }
        *self.position.lock() = Some(node);
    }

    fn detach(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

/// Handle returned from `subscribe`; drives one cursor.
///
/// Dropping the handle does not cancel the subscription; call
/// [`cancel`](SubscriptionHandle::cancel) to detach early.
pub struct SubscriptionHandle<T> {
    cursor: Arc<Cursor<T>>,
}

impl<T> SubscriptionHandle<T> {
    pub(crate) fn new(cursor: Arc<Cursor<T>>) -> Self {
        Self { cursor }
    }

    /// Authorize delivery of `n` further items.
    pub fn request(&self, n: u64) -> Result<()> {
        self.cursor.request(n)
    }

    /// Detach without receiving further signals. Idempotent.
    pub fn cancel(&self) {
        self.cursor.cancel();
    }

    /// Whether the cursor has completed or been cancelled.
    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    pub fn id(&self) -> SubscriberId {
        self.cursor.id()
    }
}
