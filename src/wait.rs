//! FIFO queue of suspended waiters.
//!
//! A task that cannot complete a transfer parks here: it registers its waker
//! and suspends by returning `Poll::Pending`. Waiter records are owned by the
//! queue itself, in a generational arena, and referenced by the index handed
//! back on enqueue; nothing lives on the suspended caller's stack.
//!
//! Waking and removal are decoupled on purpose: [`WaitQueue::wake_first`] and
//! [`WaitQueue::wake_all`] wake tasks without touching their records; the
//! record is removed by the resumed waiter itself once it is polled again (or
//! by its future's destructor if the wait is abandoned). Until then the
//! waiter keeps its place, so wake order is strictly arrival order.

use std::collections::VecDeque;
use std::task::Waker;

use crate::util::{Arena, ArenaIndex};

/// Identifier of one parked waiter within a [`WaitQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaiterId(ArenaIndex);

/// An ordered collection of suspended-task records.
#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: Arena<Waker>,
    /// Arrival order of arena indices. May contain stale entries for
    /// already-removed waiters; they are pruned lazily while scanning.
    order: VecDeque<ArenaIndex>,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: Arena::new(),
            order: VecDeque::new(),
        }
    }

    /// Number of live waiters.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Returns true if no waiter is parked.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Parks a waiter at the tail of the queue.
    pub fn enqueue(&mut self, waker: Waker) -> WaiterId {
        let index = self.waiters.insert(waker);
        self.order.push_back(index);
        WaiterId(index)
    }

    /// Removes a parked record. Called by the resumed waiter, never by the
    /// task that woke it. Returns false if the record was already gone.
    pub fn remove(&mut self, id: WaiterId) -> bool {
        let removed = self.waiters.remove(id.0).is_some();
        while let Some(&head) = self.order.front() {
            if self.waiters.contains(head) {
                break;
            }
            self.order.pop_front();
        }
        removed
    }

    /// Wakes the first live waiter without removing its record.
    ///
    /// Waking an already-woken head again is harmless; it stays at the head
    /// until it resumes and unparks itself.
    pub fn wake_first(&mut self) {
        while let Some(&head) = self.order.front() {
            if let Some(waker) = self.waiters.get(head) {
                waker.wake_by_ref();
                return;
            }
            self.order.pop_front();
        }
    }

    /// Wakes every live waiter in arrival order without removing records.
    pub fn wake_all(&mut self) {
        self.order.retain(|index| self.waiters.contains(*index));
        for index in &self.order {
            if let Some(waker) = self.waiters.get(*index) {
                waker.wake_by_ref();
            }
        }
    }
}
