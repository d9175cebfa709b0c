//! Configuration for the cooperative runtime.

/// Configuration for [`Runtime`](super::Runtime).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of steps [`run_until_quiescent`] will execute before
    /// giving up, as a guard against accidental wake loops. `None` disables
    /// the guard.
    ///
    /// [`run_until_quiescent`]: super::Runtime::run_until_quiescent
    pub max_steps: Option<u64>,
}

impl RuntimeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_steps: Some(1_000_000),
        }
    }

    /// Sets the step cap for `run_until_quiescent`.
    #[must_use]
    pub const fn max_steps(mut self, steps: Option<u64>) -> Self {
        self.max_steps = steps;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}
