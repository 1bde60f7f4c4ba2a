//! Emission gate serializing concurrent producers into one logical writer.
//!
//! A producer hands its signal to the gate's queue, then races to claim the
//! single-active-writer token. The winner applies its own signal and keeps
//! draining signals queued by producers that lost the race until none remain;
//! losers return as soon as their signal is queued, never blocking. Queue
//! order plus the single writer yield a strict total order of appended
//! signals under arbitrary producer concurrency.

use crate::bus::SignalBus;
use crate::error::{BusError, Result};
use crate::types::{ErrorPayload, Signal};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};

/// Multi-producer front end for a [`SignalBus`].
pub struct EmissionGate<T, B: SignalBus<T>> {
    bus: B,
    sender: Sender<Signal<T>>,
    receiver: Receiver<Signal<T>>,
    /// Writer-ownership token: zero means the gate is idle; each queued
    /// signal adds one, and the producer that moves it off zero drains.
    wip: AtomicU64,
}

impl<T, B: SignalBus<T>> EmissionGate<T, B> {
    pub fn new(bus: B) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            bus,
            sender,
            receiver,
            wip: AtomicU64::new(0),
        }
    }

    /// The bus behind the gate; subscribe through this.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Queue a data item for the active writer.
    pub fn emit(&self, value: T) -> Result<()> {
        self.push(Signal::Item(value))
    }

    /// Queue the completion marker.
    pub fn complete(&self) -> Result<()> {
        self.push(Signal::Complete)
    }

    /// Queue a terminal error.
    pub fn fail(&self, error: ErrorPayload) -> Result<()> {
        self.push(Signal::Error(error))
    }

    fn push(&self, signal: Signal<T>) -> Result<()> {
        // Best-effort early rejection; a signal racing with the terminal one
        // may still be queued and is dropped by the active writer below.
        if self.bus.is_terminated() {
            return Err(BusError::Terminated);
        }
        self.sender
            .send(signal)
            .unwrap_or_else(|_| unreachable!("gate owns its receiver"));

        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            // Another producer holds the writer token and will apply the
            // queued signal; hand off and return.
            return Ok(());
        }
        let mut missed = 1;
        loop {
            for _ in 0..missed {
                if let Ok(signal) = self.receiver.try_recv() {
                    self.apply(signal);
                }
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if previous == missed {
                return Ok(());
            }
            missed = previous - missed;
        }
    }

    fn apply(&self, signal: Signal<T>) {
        let applied = match signal {
            Signal::Item(value) => self.bus.emit(value).map(drop),
            Signal::Complete => self.bus.complete(),
            Signal::Error(error) => self.bus.fail(error),
        };
        if let Err(error) = applied {
            tracing::debug!(%error, "dropped signal queued behind the terminal one");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ReplayBus;
    use crate::cursor::SignalObserver;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct Collect {
        items: Mutex<Vec<u64>>,
        completed: AtomicBool,
    }

    impl SignalObserver<u64> for Arc<Collect> {
        fn on_item(&self, value: &u64) {
            self.items.lock().push(*value);
        }

        fn on_complete(&self) {
            self.completed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_single_producer_passthrough() {
        let gate = EmissionGate::new(ReplayBus::unbounded());
        gate.emit(1).unwrap();
        gate.emit(2).unwrap();
        gate.complete().unwrap();

        let collect = Arc::new(Collect::default());
        gate.bus().subscribe(collect.clone()).request(10).unwrap();
        assert_eq!(*collect.items.lock(), vec![1, 2]);
        assert!(collect.completed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_emit_after_terminal_rejected() {
        let gate = EmissionGate::new(ReplayBus::unbounded());
        gate.complete().unwrap();
        assert_eq!(gate.emit(1).unwrap_err(), BusError::Terminated);
    }

    #[test]
    fn test_concurrent_producers_total_order() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 250;

        let gate = Arc::new(EmissionGate::new(ReplayBus::unbounded()));
        let collect = Arc::new(Collect::default());
        let handle = gate.bus().subscribe(collect.clone());
        handle.request(u64::MAX).unwrap();

        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let gate = gate.clone();
            producers.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    gate.emit(p * PER_PRODUCER + i).unwrap();
                }
            }));
        }
        for producer in producers {
            producer.join().unwrap();
        }
        gate.complete().unwrap();

        let items = collect.items.lock();
        assert_eq!(items.len(), (PRODUCERS * PER_PRODUCER) as usize);
        assert!(collect.completed.load(Ordering::SeqCst));

        // Every signal arrived exactly once, and each producer's own signals
        // kept their emission order.
        let mut seen = items.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), items.len());
        for p in 0..PRODUCERS {
            let own: Vec<_> = items
                .iter()
                .filter(|&&v| v / PER_PRODUCER == p)
                .copied()
                .collect();
            assert!(own.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
