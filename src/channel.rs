//! A single bounded channel: message storage plus its two wait queues.
//!
//! The channel implements the non-blocking half of the transfer protocol.
//! The blocking half (park on `WouldBlock`, retry on wake) lives in the
//! futures in [`crate::bus`]; registry validation lives there too.

use crate::error::{BusError, Result};
use crate::queue::MessageQueue;
use crate::wait::WaitQueue;
use crate::Message;

/// One bounded channel owned by a registry slot.
#[derive(Debug)]
pub(crate) struct Channel {
    /// Bus-unique identity, so a waiter resumed after its slot was reused
    /// never touches the replacement channel's wait queues.
    serial: u64,
    capacity: usize,
    queue: MessageQueue,
    /// Tasks waiting until the channel is not full.
    pub(crate) senders: WaitQueue,
    /// Tasks waiting until the channel is not empty.
    pub(crate) receivers: WaitQueue,
}

impl Channel {
    pub(crate) const fn new(serial: u64, capacity: usize) -> Self {
        Self {
            serial,
            capacity,
            queue: MessageQueue::new(),
            senders: WaitQueue::new(),
            receivers: WaitQueue::new(),
        }
    }

    pub(crate) const fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    /// A zero-capacity channel is permanently full.
    pub(crate) fn is_full(&self) -> bool {
        self.queue.len() == self.capacity
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Non-blocking vectorized send step.
    ///
    /// Fails `WouldBlock` when already full; otherwise accepts
    /// `min(values.len(), capacity - len)` messages (a partial transfer is
    /// success) and wakes the first waiting receiver.
    pub(crate) fn try_push_many(&mut self, values: &[Message]) -> Result<usize> {
        if self.is_full() {
            return Err(BusError::WouldBlock);
        }
        let accepted = values.len().min(self.capacity - self.queue.len());
        self.queue.append_many(&values[..accepted]);
        self.receivers.wake_first();
        Ok(accepted)
    }

    /// Non-blocking vectorized receive step.
    ///
    /// Fails `WouldBlock` when empty; otherwise delivers
    /// `min(len, out.len())` messages from the head into `out` and wakes the
    /// first waiting sender.
    pub(crate) fn try_pop_many(&mut self, out: &mut [Message]) -> Result<usize> {
        if self.queue.is_empty() {
            return Err(BusError::WouldBlock);
        }
        let delivered = self.queue.len().min(out.len());
        self.queue.pop_first_many(&mut out[..delivered]);
        self.senders.wake_first();
        Ok(delivered)
    }

    /// Broadcast delivery: append one message and wake the first waiting
    /// receiver. The bus has already checked that no channel is full.
    pub(crate) fn push(&mut self, value: Message) {
        debug_assert!(!self.is_full(), "broadcast delivery to a full channel");
        self.queue.append_many(&[value]);
        self.receivers.wake_first();
    }
}
