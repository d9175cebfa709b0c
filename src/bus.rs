//! The bus registry and its handle-based operation surface.
//!
//! A [`Bus`] owns a table of channel slots addressed by small integer
//! handles. Every operation validates its handle against the table first;
//! blocking operations are futures that retry their non-blocking step,
//! parking in the channel's wait queue on [`BusError::WouldBlock`] and
//! retrying when woken by a peer transfer or by close.
//!
//! All state is single-threaded: exactly one task runs at a time and every
//! mutation completes before a suspension point, so interior mutability via
//! `RefCell` is sufficient and no operation ever observes a half-applied
//! transfer.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::channel::Channel;
use crate::error::{BusError, Result};
use crate::wait::WaiterId;
use crate::Message;

/// Handle of one channel slot in the bus registry.
///
/// Handles are stable for the lifetime of the occupied slot. After
/// [`Bus::close`] frees a slot, a later [`Bus::open`] may hand the same
/// integer out again; a stale copy of the old handle then addresses the new
/// channel. That aliasing is a caller hazard the bus does not prevent:
/// callers that close channels must retire their copies of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Returns the raw slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Where a blocking future is currently parked.
///
/// The serial pins the channel's identity: if the slot is closed and reused
/// while we sleep, the record must not be torn out of the new occupant.
#[derive(Debug, Clone, Copy)]
struct Parked {
    chan: ChannelId,
    serial: u64,
    waiter: WaiterId,
}

#[derive(Debug, Default)]
struct BusState {
    slots: Vec<Option<Channel>>,
    next_serial: u64,
}

impl BusState {
    fn slot(&self, id: ChannelId) -> Option<&Channel> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel> {
        self.slot_mut(id).ok_or(BusError::NoChannel)
    }

    fn open(&mut self, capacity: usize) -> ChannelId {
        let serial = self.next_serial;
        self.next_serial += 1;
        let channel = Channel::new(serial, capacity);

        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(channel);
                free
            }
            None => {
                self.slots.push(Some(channel));
                self.slots.len() - 1
            }
        };
        ChannelId(u32::try_from(index).expect("bus registry overflow"))
    }

    /// All-or-nothing delivery to every open channel.
    fn try_broadcast(&mut self, value: Message) -> Result<()> {
        // Global precondition first: one full channel fails the whole
        // operation before any channel is touched.
        if self.slots.iter().flatten().any(Channel::is_full) {
            return Err(BusError::WouldBlock);
        }

        let mut delivered = false;
        for channel in self.slots.iter_mut().flatten() {
            channel.push(value);
            delivered = true;
        }
        if delivered {
            Ok(())
        } else {
            Err(BusError::NoChannel)
        }
    }

    /// Parks a would-block broadcaster on the sender queue of one full
    /// channel; a receive there re-triggers the whole-bus retry.
    fn park_broadcast(&mut self, waker: &Waker) -> Parked {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(channel) = slot.as_mut() else { continue };
            if channel.is_full() {
                return Parked {
                    chan: ChannelId(u32::try_from(index).expect("bus registry overflow")),
                    serial: channel.serial(),
                    waiter: channel.senders.enqueue(waker.clone()),
                };
            }
        }
        unreachable!("broadcast would block but no channel is full")
    }

    fn unpark_sender(&mut self, parked: Parked) {
        if let Some(channel) = self.slot_mut(parked.chan) {
            if channel.serial() == parked.serial {
                channel.senders.remove(parked.waiter);
            }
        }
    }

    fn unpark_receiver(&mut self, parked: Parked) {
        if let Some(channel) = self.slot_mut(parked.chan) {
            if channel.serial() == parked.serial {
                channel.receivers.remove(parked.waiter);
            }
        }
    }
}

impl Drop for BusState {
    fn drop(&mut self) {
        // Whole-bus teardown closes every remaining channel: wake both wait
        // queues so no waiter is left stranded.
        for slot in &mut self.slots {
            if let Some(channel) = slot.as_mut() {
                channel.receivers.wake_all();
                channel.senders.wake_all();
            }
        }
    }
}

/// A message bus: a registry of bounded channels plus the transfer protocol.
///
/// `Bus` is a cheap handle (`Rc` clone) to single-threaded shared state;
/// clone it freely into the tasks that communicate over it. Dropping the
/// last handle closes every remaining channel.
#[derive(Debug, Clone, Default)]
pub struct Bus {
    state: Rc<RefCell<BusState>>,
}

impl Bus {
    /// Creates a bus with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new channel with the given capacity and returns its handle.
    ///
    /// The lowest free registry slot is reused; the table grows by one when
    /// none is free. A capacity of zero is allowed: such a channel is
    /// permanently full and empty, so every transfer on it blocks.
    pub fn open(&self, capacity: usize) -> ChannelId {
        let id = self.state.borrow_mut().open(capacity);
        tracing::debug!(channel = %id, capacity, "channel opened");
        id
    }

    /// Closes a channel, waking every task waiting on it.
    ///
    /// The slot is cleared before any wake, so woken waiters (and any later
    /// operation on the stale handle) observe [`BusError::NoChannel`].
    /// Closure is terminal: there is no reopening a slot except through
    /// [`Bus::open`], which installs a brand-new channel.
    ///
    /// # Panics
    ///
    /// Closing a handle that is not open is a caller error and panics.
    pub fn close(&self, id: ChannelId) {
        let mut state = self.state.borrow_mut();
        let mut channel = state
            .slots
            .get_mut(id.index())
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("close of unknown channel handle {id}"));
        tracing::debug!(
            channel = %id,
            receivers = channel.receivers.len(),
            senders = channel.senders.len(),
            "channel closed"
        );
        channel.receivers.wake_all();
        channel.senders.wake_all();
    }

    /// Sends one message without blocking.
    ///
    /// # Errors
    ///
    /// - [`BusError::NoChannel`] if the handle is invalid
    /// - [`BusError::WouldBlock`] if the channel is full
    pub fn try_send(&self, id: ChannelId, value: Message) -> Result<()> {
        self.try_send_many(id, &[value]).map(|_| ())
    }

    /// Sends up to `values.len()` messages without blocking and returns how
    /// many were accepted.
    ///
    /// A partial transfer is a success: the channel takes
    /// `min(values.len(), capacity - len)` messages from the front of
    /// `values` and the caller compares the returned count against the
    /// requested one. The first waiting receiver is woken.
    ///
    /// # Errors
    ///
    /// - [`BusError::NoChannel`] if the handle is invalid
    /// - [`BusError::WouldBlock`] if the channel is already full
    pub fn try_send_many(&self, id: ChannelId, values: &[Message]) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        state.channel_mut(id)?.try_push_many(values)
    }

    /// Receives one message without blocking.
    ///
    /// # Errors
    ///
    /// - [`BusError::NoChannel`] if the handle is invalid
    /// - [`BusError::WouldBlock`] if the channel is empty
    pub fn try_recv(&self, id: ChannelId) -> Result<Message> {
        let mut buf = [0; 1];
        self.try_recv_many(id, &mut buf)?;
        Ok(buf[0])
    }

    /// Receives up to `buf.len()` messages without blocking and returns how
    /// many were delivered.
    ///
    /// Delivers `min(len, buf.len())` messages from the head of the queue
    /// into the front of `buf` and wakes the first waiting sender.
    ///
    /// # Errors
    ///
    /// - [`BusError::NoChannel`] if the handle is invalid
    /// - [`BusError::WouldBlock`] if the channel is empty
    pub fn try_recv_many(&self, id: ChannelId, buf: &mut [Message]) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        state.channel_mut(id)?.try_pop_many(buf)
    }

    /// Delivers one message to every open channel, all-or-nothing.
    ///
    /// # Errors
    ///
    /// - [`BusError::WouldBlock`] if any open channel is full; no channel is
    ///   modified in that case
    /// - [`BusError::NoChannel`] if no channel is open at all
    pub fn try_broadcast(&self, value: Message) -> Result<()> {
        self.state.borrow_mut().try_broadcast(value)
    }

    /// Sends one message, suspending while the channel is full.
    ///
    /// Resolves `Ok(())` once the message is queued, or
    /// [`BusError::NoChannel`] if the handle is invalid or the channel is
    /// closed while waiting.
    pub fn send(&self, id: ChannelId, value: Message) -> SendFuture<'_> {
        SendFuture {
            bus: self,
            chan: id,
            value,
            parked: None,
        }
    }

    /// Sends up to `values.len()` messages, suspending while the channel is
    /// full, and resolves to the accepted count.
    ///
    /// Like [`Bus::try_send_many`], a partial transfer is a success; the
    /// future completes on the first attempt that accepts at least one
    /// message. After completing it wakes the next waiting sender if room
    /// remains, so a line of blocked senders drains progressively.
    pub fn send_many<'a>(&'a self, id: ChannelId, values: &'a [Message]) -> SendManyFuture<'a> {
        SendManyFuture {
            bus: self,
            chan: id,
            values,
            parked: None,
        }
    }

    /// Receives one message, suspending while the channel is empty.
    pub fn recv(&self, id: ChannelId) -> RecvFuture<'_> {
        RecvFuture {
            bus: self,
            chan: id,
            parked: None,
        }
    }

    /// Receives up to `buf.len()` messages, suspending while the channel is
    /// empty, and resolves to the delivered count.
    ///
    /// After completing it wakes the next waiting receiver if data remains.
    pub fn recv_many<'a>(&'a self, id: ChannelId, buf: &'a mut [Message]) -> RecvManyFuture<'a> {
        RecvManyFuture {
            bus: self,
            chan: id,
            buf,
            parked: None,
        }
    }

    /// Delivers one message to every open channel, suspending while any
    /// channel is full.
    ///
    /// Each retry re-evaluates the whole-bus precondition from scratch: the
    /// future parks on one currently-full channel, and a receive there wakes
    /// it to re-scan every channel, not just that one.
    pub fn broadcast(&self, value: Message) -> BroadcastFuture<'_> {
        BroadcastFuture {
            bus: self,
            value,
            parked: None,
        }
    }

    /// Returns true if the handle names a live channel.
    #[must_use]
    pub fn is_open(&self, id: ChannelId) -> bool {
        self.state.borrow().slot(id).is_some()
    }

    /// Number of messages queued in a channel, or `None` for a dead handle.
    #[must_use]
    pub fn channel_len(&self, id: ChannelId) -> Option<usize> {
        self.state.borrow().slot(id).map(Channel::len)
    }

    /// Capacity of a channel, or `None` for a dead handle.
    #[must_use]
    pub fn channel_capacity(&self, id: ChannelId) -> Option<usize> {
        self.state.borrow().slot(id).map(Channel::capacity)
    }

    /// Number of currently open channels.
    #[must_use]
    pub fn open_channels(&self) -> usize {
        self.state.borrow().slots.iter().flatten().count()
    }

    /// One blocking-send attempt: unpark, retry, re-park at the tail on
    /// `WouldBlock`. Re-parking at the tail (rather than holding the old
    /// record) mirrors the retry loop of the wait protocol: a waiter that
    /// could not proceed after being woken queues behind later arrivals.
    fn poll_send_many(
        &self,
        chan: ChannelId,
        values: &[Message],
        parked: &mut Option<Parked>,
        waker: &Waker,
    ) -> Poll<Result<usize>> {
        let mut state = self.state.borrow_mut();
        if let Some(p) = parked.take() {
            state.unpark_sender(p);
        }
        let channel = match state.channel_mut(chan) {
            Ok(channel) => channel,
            Err(e) => return Poll::Ready(Err(e)),
        };
        match channel.try_push_many(values) {
            Ok(accepted) => {
                if !channel.is_full() {
                    channel.senders.wake_first();
                }
                Poll::Ready(Ok(accepted))
            }
            Err(BusError::WouldBlock) => {
                *parked = Some(Parked {
                    chan,
                    serial: channel.serial(),
                    waiter: channel.senders.enqueue(waker.clone()),
                });
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_recv_many(
        &self,
        chan: ChannelId,
        buf: &mut [Message],
        parked: &mut Option<Parked>,
        waker: &Waker,
    ) -> Poll<Result<usize>> {
        let mut state = self.state.borrow_mut();
        if let Some(p) = parked.take() {
            state.unpark_receiver(p);
        }
        let channel = match state.channel_mut(chan) {
            Ok(channel) => channel,
            Err(e) => return Poll::Ready(Err(e)),
        };
        match channel.try_pop_many(buf) {
            Ok(delivered) => {
                if !channel.is_empty() {
                    channel.receivers.wake_first();
                }
                Poll::Ready(Ok(delivered))
            }
            Err(BusError::WouldBlock) => {
                *parked = Some(Parked {
                    chan,
                    serial: channel.serial(),
                    waiter: channel.receivers.enqueue(waker.clone()),
                });
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_broadcast(
        &self,
        value: Message,
        parked: &mut Option<Parked>,
        waker: &Waker,
    ) -> Poll<Result<()>> {
        let mut state = self.state.borrow_mut();
        if let Some(p) = parked.take() {
            state.unpark_sender(p);
        }
        match state.try_broadcast(value) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(BusError::WouldBlock) => {
                *parked = Some(state.park_broadcast(waker));
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn drop_parked_sender(&self, parked: &mut Option<Parked>) {
        if let Some(p) = parked.take() {
            self.state.borrow_mut().unpark_sender(p);
        }
    }

    fn drop_parked_receiver(&self, parked: &mut Option<Parked>) {
        if let Some(p) = parked.take() {
            self.state.borrow_mut().unpark_receiver(p);
        }
    }
}

/// Future of [`Bus::send`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct SendFuture<'a> {
    bus: &'a Bus,
    chan: ChannelId,
    value: Message,
    parked: Option<Parked>,
}

impl Future for SendFuture<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let value = this.value;
        this.bus
            .poll_send_many(this.chan, &[value], &mut this.parked, cx.waker())
            .map(|result| result.map(|_| ()))
    }
}

impl Drop for SendFuture<'_> {
    fn drop(&mut self) {
        self.bus.drop_parked_sender(&mut self.parked);
    }
}

/// Future of [`Bus::send_many`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct SendManyFuture<'a> {
    bus: &'a Bus,
    chan: ChannelId,
    values: &'a [Message],
    parked: Option<Parked>,
}

impl Future for SendManyFuture<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.bus
            .poll_send_many(this.chan, this.values, &mut this.parked, cx.waker())
    }
}

impl Drop for SendManyFuture<'_> {
    fn drop(&mut self) {
        self.bus.drop_parked_sender(&mut self.parked);
    }
}

/// Future of [`Bus::recv`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct RecvFuture<'a> {
    bus: &'a Bus,
    chan: ChannelId,
    parked: Option<Parked>,
}

impl Future for RecvFuture<'_> {
    type Output = Result<Message>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut buf = [0; 1];
        match this
            .bus
            .poll_recv_many(this.chan, &mut buf, &mut this.parked, cx.waker())
        {
            Poll::Ready(result) => Poll::Ready(result.map(|_| buf[0])),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RecvFuture<'_> {
    fn drop(&mut self) {
        self.bus.drop_parked_receiver(&mut self.parked);
    }
}

/// Future of [`Bus::recv_many`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct RecvManyFuture<'a> {
    bus: &'a Bus,
    chan: ChannelId,
    buf: &'a mut [Message],
    parked: Option<Parked>,
}

impl Future for RecvManyFuture<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.bus
            .poll_recv_many(this.chan, this.buf, &mut this.parked, cx.waker())
    }
}

impl Drop for RecvManyFuture<'_> {
    fn drop(&mut self) {
        self.bus.drop_parked_receiver(&mut self.parked);
    }
}

/// Future of [`Bus::broadcast`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct BroadcastFuture<'a> {
    bus: &'a Bus,
    value: Message,
    parked: Option<Parked>,
}

impl Future for BroadcastFuture<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.bus
            .poll_broadcast(this.value, &mut this.parked, cx.waker())
    }
}

impl Drop for BroadcastFuture<'_> {
    fn drop(&mut self) {
        self.bus.drop_parked_sender(&mut self.parked);
    }
}
