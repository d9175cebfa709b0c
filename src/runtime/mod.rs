//! Cooperative single-threaded runtime: task storage, FIFO scheduling, and
//! the executor loop.
//!
//! The bus never creates or destroys tasks; its callers spawn them here.
//! See [`Runtime`] for the step/run loop and [`yield_now`] for the explicit
//! cooperation point.

mod config;
mod executor;
mod scheduler;

pub use config::RuntimeConfig;
pub use executor::{yield_now, Runtime, YieldNow};

use core::fmt;

use crate::util::ArenaIndex;

/// Identifier of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(ArenaIndex);

impl TaskId {
    /// Creates a task id from its arena index.
    #[must_use]
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}.{}", self.0.index(), self.0.generation())
    }
}
