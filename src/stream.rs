//! Blocking channel view over a subscription.
//!
//! Wraps a cursor in a crossbeam channel so a consumer thread can pull
//! signals with `recv`-style calls instead of implementing an observer.
//! Demand is managed for the caller: a batch is requested up front and
//! replenished one-for-one as items are taken off the channel, so at most
//! `batch` items are ever buffered ahead of the consumer.

use crate::bus::{ReplayBus, SignalBus};
use crate::cursor::{SignalObserver, SubscriptionHandle};
use crate::types::{ErrorPayload, Signal};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Default in-flight demand for a stream view.
const DEFAULT_BATCH: u64 = 32;

struct ChannelObserver<T> {
    sender: Sender<Signal<T>>,
}

impl<T: Clone + Send + Sync> SignalObserver<T> for ChannelObserver<T> {
    fn on_item(&self, value: &T) {
        let _ = self.sender.send(Signal::Item(value.clone()));
    }

    fn on_complete(&self) {
        let _ = self.sender.send(Signal::Complete);
    }

    fn on_error(&self, error: &ErrorPayload) {
        let _ = self.sender.send(Signal::Error(error.clone()));
    }
}

/// Pull-based view of one subscription.
pub struct EventStream<T> {
    handle: SubscriptionHandle<T>,
    receiver: Receiver<Signal<T>>,
    finished: bool,
}

impl<T: Clone + Send + Sync + 'static> EventStream<T> {
    pub(crate) fn attach(bus: &ReplayBus<T>, batch: u64) -> Self {
        let batch = batch.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = bus.subscribe(ChannelObserver { sender });
        // A fresh cursor is open; the initial request cannot be a no-op.
        handle
            .request(batch)
            .expect("initial batch demand is positive");
        Self {
            handle,
            receiver,
            finished: false,
        }
    }

    /// Block until the next signal. Returns `None` once the terminal signal
    /// has been taken or the stream was cancelled.
    pub fn recv(&mut self) -> Option<Signal<T>> {
        if self.finished {
            return None;
        }
        match self.receiver.recv() {
            Ok(signal) => Some(self.took(signal)),
            Err(_) => None,
        }
    }

    /// Non-blocking variant of [`recv`](EventStream::recv).
    pub fn try_recv(&mut self) -> Option<Signal<T>> {
        if self.finished {
            return None;
        }
        self.receiver.try_recv().ok().map(|signal| self.took(signal))
    }

    /// Block up to `timeout` for the next signal.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Signal<T>> {
        if self.finished {
            return None;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(signal) => Some(self.took(signal)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Detach from the bus without waiting for the terminal signal.
    pub fn cancel(&mut self) {
        self.finished = true;
        self.handle.cancel();
    }

    fn took(&mut self, signal: Signal<T>) -> Signal<T> {
        if signal.is_terminal() {
            self.finished = true;
        } else {
            // Replenish one unit of demand per item taken off the channel.
            let _ = self.handle.request(1);
        }
        signal
    }
}

impl<T: Send + Sync + 'static> ReplayBus<T> {
    /// Attach a blocking stream view with the default in-flight batch.
    pub fn stream(&self) -> EventStream<T>
    where
        T: Clone,
    {
        EventStream::attach(self, DEFAULT_BATCH)
    }

    /// Attach a blocking stream view buffering at most `batch` undelivered
    /// items.
    pub fn stream_with_batch(&self, batch: u64) -> EventStream<T>
    where
        T: Clone,
    {
        EventStream::attach(self, batch)
    }
}
