//! Exponential backoff between code generator retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with configurable min/max.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    /// Creates a new backoff starting at `initial`, capping at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            max: max.max(initial),
            current: initial,
        }
    }

    /// Creates a backoff from millisecond bounds, as found in configuration.
    pub fn from_millis(initial_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(initial_ms), Duration::from_millis(max_ms))
    }

    /// Returns the delay the next retry would wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Returns the delay to wait now and doubles the following one (capped at max).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}
