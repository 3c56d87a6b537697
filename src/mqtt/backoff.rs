//! Exponential reconnect backoff

use std::time::Duration;

/// Doubling delay between reconnect attempts, capped at a maximum.
///
/// Delays handed out by [`Backoff::next_delay`] never decrease until
/// [`Backoff::reset`] is called.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
            attempts: 0,
        }
    }

    /// Returns the delay for the next attempt and advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Back to the minimum delay, called after a successful connect
    pub fn reset(&mut self) {
        self.current = self.min;
        self.attempts = 0;
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
