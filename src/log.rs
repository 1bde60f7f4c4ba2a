//! Append-only signal log with policy-driven eviction.
//!
//! The log is a forward-linked chain of immutable nodes. Each node's link is
//! written exactly once, under the writer lock, so cursors traverse the chain
//! concurrently without taking any lock. Eviction advances the log's offer
//! point past aged or excess nodes; it never unlinks a node, so a cursor that
//! has already walked past the offer point keeps its no-gap view of the chain.

use crate::clock::Clock;
use crate::error::{BusError, Result};
use crate::policy::EvictionPolicy;
use crate::types::{ErrorPayload, Sequence, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// What a node in the chain carries.
#[derive(Debug)]
pub(crate) enum Entry<T> {
    /// Sentinel at the start of every chain; never delivered.
    Root,
    /// Synthetic default value, offered only until the first real item
    /// arrives. Never evicted by age.
    Seed(T),
    /// A data item.
    Item(T),
    /// Normal termination.
    Complete,
    /// Abnormal termination.
    Error(ErrorPayload),
}

impl<T> Entry<T> {
    fn is_terminal(&self) -> bool {
        matches!(self, Entry::Complete | Entry::Error(_))
    }
}

/// One immutable, timestamped signal in the chain.
#[derive(Debug)]
pub(crate) struct Node<T> {
    pub seq: Sequence,
    pub timestamp: Timestamp,
    pub entry: Entry<T>,
    next: OnceLock<Arc<Node<T>>>,
}

impl<T> Node<T> {
    fn new(seq: Sequence, timestamp: Timestamp, entry: Entry<T>) -> Arc<Self> {
        Arc::new(Self {
            seq,
            timestamp,
            entry,
            next: OnceLock::new(),
        })
    }

    /// The next node in the chain, if one has been published.
    pub fn next(&self) -> Option<&Arc<Node<T>>> {
        self.next.get()
    }

    fn link(&self, next: Arc<Node<T>>) {
        // Appends are serialized by the log's writer lock; a second link on
        // the same node is a corrupted chain.
        assert!(self.next.set(next).is_ok(), "signal node linked twice");
    }
}

struct LogState<T> {
    /// Offer point: new cursors start here and deliver `head.next()` onward.
    head: Arc<Node<T>>,
    /// Most recently appended node.
    tail: Arc<Node<T>>,
    /// Data nodes currently between `head` and `tail`.
    retained: usize,
}

impl<T> Drop for LogState<T> {
    fn drop(&mut self) {
        // Unlink the chain iteratively; dropping a long retained window
        // through the nested `Arc`s would otherwise recurse once per node.
        let mut node = std::mem::replace(
            &mut self.head,
            Node::new(Sequence(0), Timestamp(0), Entry::Root),
        );
        loop {
            let next = match Arc::get_mut(&mut node) {
                Some(inner) => inner.next.take(),
                // Shared with a live cursor; its owner frees the rest.
                None => break,
            };
            match next {
                Some(next) => node = next,
                None => break,
            }
        }
    }
}

/// The retention core: bounded history plus the single terminal signal.
pub(crate) struct ReplayLog<T> {
    policy: EvictionPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<LogState<T>>,
    terminated: AtomicBool,
}

impl<T> ReplayLog<T> {
    /// Create an empty log, optionally seeded with a default value.
    pub fn new(policy: EvictionPolicy, clock: Arc<dyn Clock>, seed: Option<T>) -> Self {
        policy.validate();
        let root = Node::new(Sequence(0), clock.now(), Entry::Root);
        let tail = match seed {
            Some(value) => {
                let node = Node::new(root.seq.next(), root.timestamp, Entry::Seed(value));
                root.link(node.clone());
                node
            }
            None => root.clone(),
        };
        Self {
            policy,
            clock,
            state: Mutex::new(LogState {
                head: root,
                tail,
                retained: 0,
            }),
            terminated: AtomicBool::new(false),
        }
    }

    /// Append a data item, then run an eviction pass.
    ///
    /// Rejected once the log is terminated.
    pub fn append(&self, value: T) -> Result<Arc<Node<T>>> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if self.terminated.load(Ordering::Acquire) {
            return Err(BusError::Terminated);
        }

        let node = Node::new(state.tail.seq.next(), now, Entry::Item(value));
        state.tail.link(node.clone());
        state.tail = node.clone();
        state.retained += 1;
        tracing::trace!(seq = %node.seq, "appended signal");

        // The first real item unseats the seeded default.
        self.drop_seed(&mut state);
        self.trim(&mut state, now, false);
        Ok(node)
    }

    /// Append the completion marker and freeze the log.
    pub fn complete(&self) -> Result<Arc<Node<T>>> {
        self.terminate(Entry::Complete)
    }

    /// Append a terminal error and freeze the log.
    pub fn fail(&self, error: ErrorPayload) -> Result<Arc<Node<T>>> {
        self.terminate(Entry::Error(error))
    }

    fn terminate(&self, entry: Entry<T>) -> Result<Arc<Node<T>>> {
        debug_assert!(entry.is_terminal());
        let now = self.clock.now();
        let mut state = self.state.lock();
        if self.terminated.swap(true, Ordering::AcqRel) {
            return Err(BusError::Terminated);
        }

        let node = Node::new(state.tail.seq.next(), now, entry);
        state.tail.link(node.clone());
        state.tail = node.clone();
        tracing::debug!(seq = %node.seq, retained = state.retained, "terminated signal log");

        // Eviction freezes at termination: the final pass enforces only the
        // size bound, so late subscribers observe whatever was retained at
        // the moment of termination no matter how much time passes.
        self.trim(&mut state, now, true);
        Ok(node)
    }

    /// Current offer point for a newly attaching cursor.
    ///
    /// Re-evaluates the policy lazily against `now`; after termination the
    /// window is frozen and returned as-is.
    pub fn snapshot_head(&self) -> Arc<Node<T>> {
        let mut state = self.state.lock();
        if !self.terminated.load(Ordering::Acquire) {
            let now = self.clock.now();
            self.trim(&mut state, now, false);
        }
        state.head.clone()
    }

    /// Number of data items a subscriber attaching now would replay, before
    /// re-evaluating the age bound.
    pub fn retained_len(&self) -> usize {
        self.state.lock().retained
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    fn drop_seed(&self, state: &mut LogState<T>) {
        let seed = match state.head.next() {
            Some(next) if matches!(next.entry, Entry::Seed(_)) => next.clone(),
            _ => return,
        };
        state.head = seed;
    }

    /// Advance the offer point past data nodes violating the policy.
    ///
    /// Only the offer point moves; issued nodes stay linked for cursors that
    /// already hold them. The terminal node never counts against capacity and
    /// is never trimmed.
    fn trim(&self, state: &mut LogState<T>, now: Timestamp, size_only: bool) {
        loop {
            let next = match state.head.next() {
                Some(next) => next.clone(),
                None => return,
            };
            let evict = match next.entry {
                Entry::Item(_) => {
                    let over_capacity = self
                        .policy
                        .capacity()
                        .is_some_and(|capacity| state.retained > capacity);
                    let aged_out =
                        !size_only && self.policy.expired(now.millis_since(next.timestamp));
                    over_capacity || aged_out
                }
                _ => false,
            };
            if !evict {
                return;
            }
            state.retained -= 1;
            tracing::trace!(seq = %next.seq, "evicted signal from replay window");
            state.head = next;
        }
    }
}
