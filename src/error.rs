//! Error types for bus operations.
//!
//! The bus has a deliberately closed error taxonomy:
//!
//! - [`BusError::NoChannel`]: the handle does not name a live channel
//! - [`BusError::WouldBlock`]: a non-blocking operation could not progress
//!
//! `WouldBlock` is an expected control-flow signal, not a failure: the
//! blocking operations consume it internally by suspending the calling task
//! and retrying, so it never escapes an awaited send/receive/broadcast.
//! Partial transfers are successes carrying a smaller-than-requested count,
//! never errors. Nothing in this crate is fatal except allocation failure,
//! for which the data model offers no degradation path.

use core::fmt;

/// The kind of error a bus operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusError {
    /// Handle is invalid or the channel it named has been closed.
    NoChannel,
    /// Non-blocking operation could not make progress (channel full or
    /// empty). Transient by construction; the blocking wrappers retry it.
    WouldBlock,
}

impl BusError {
    /// Returns true for the transient "could not progress" signal.
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChannel => write!(f, "no such channel"),
            Self::WouldBlock => write!(f, "operation would block"),
        }
    }
}

impl std::error::Error for BusError {}

/// A specialized Result type for bus operations.
pub type Result<T> = core::result::Result<T, BusError>;
