//! Taskbus: a bounded CSP-style message bus for cooperatively scheduled
//! single-threaded tasks.
//!
//! # Overview
//!
//! Tasks communicate through integer-handled channels with backpressure: a
//! full channel suspends producers, an empty channel suspends consumers, and
//! a suspended task yields the thread to whatever is ready instead of
//! blocking it. Transfers are vectorized (a partial transfer is a success
//! carrying a count, never an error), and a bus-wide broadcast delivers to
//! every open channel or to none.
//!
//! # Core Guarantees
//!
//! - **Bounded channels**: `0 ≤ queued ≤ capacity` at every observable point
//! - **FIFO wakes**: waiters on one channel resume in suspension order
//! - **All-or-nothing broadcast**: one full channel vetoes the delivery
//!   before any channel is modified
//! - **No stranded waiters**: closing a channel wakes everything parked on
//!   it; every waiter observes the closure on resume
//! - **Deterministic scheduling**: a single-threaded FIFO executor, so runs
//!   replay exactly
//!
//! # Module Structure
//!
//! - [`bus`]: channel registry, handles, and the operation surface
//! - [`queue`]: FIFO message storage
//! - [`wait`]: queues of suspended waiters
//! - [`error`]: the closed error taxonomy
//! - [`runtime`]: cooperative executor and FIFO scheduler
//! - [`util`]: generational arena backing task and waiter records
//! - [`test_utils`]: logging init and assertion macros for tests
//!
//! # Example
//!
//! ```
//! use taskbus::{Bus, Runtime, RuntimeConfig};
//!
//! let bus = Bus::new();
//! let channel = bus.open(2);
//! let mut runtime = Runtime::new(RuntimeConfig::new());
//!
//! let producer = bus.clone();
//! runtime.spawn(async move {
//!     for value in 0..4 {
//!         producer.send(channel, value).await.expect("channel closed");
//!     }
//! });
//!
//! let consumer = bus.clone();
//! runtime.spawn(async move {
//!     let mut got = Vec::new();
//!     while got.len() < 4 {
//!         got.push(consumer.recv(channel).await.expect("channel closed"));
//!     }
//!     assert_eq!(got, vec![0, 1, 2, 3]);
//! });
//!
//! runtime.run_until_quiescent();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
mod channel;
pub mod error;
pub mod queue;
pub mod runtime;
pub mod test_utils;
pub mod util;
pub mod wait;

// Re-exports for convenient access to core types
pub use bus::{Bus, ChannelId};
pub use error::{BusError, Result};
pub use runtime::{yield_now, Runtime, RuntimeConfig, TaskId};

/// Fixed-width message payload carried by the bus.
///
/// The bus is payload-agnostic; wider payloads are carried by value
/// elsewhere (for example as indices into caller-owned storage).
pub type Message = u32;
