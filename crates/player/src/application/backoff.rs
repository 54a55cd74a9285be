//! Exponential backoff math shared by reconnects and poll retries.
//!
//! Runtime-agnostic: callers own the timers and only ask for the next delay.

use std::time::Duration;

/// Shape of a backoff sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// `None` never exhausts (used by polling, the transport of last resort)
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// 1s, 2s, 4s, ... capped at 30s, never exhausted.
    pub const fn unbounded() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Exponential backoff state.
#[derive(Debug, Clone, Copy)]
pub struct BackoffState {
    policy: BackoffPolicy,
    attempts: u32,
    delay: Duration,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            delay: policy.initial,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
    }

    /// Advance to the next attempt, updating the delay for the subsequent attempt.
    ///
    /// Returns the delay to wait *before* performing this attempt.
    pub fn next_delay_and_advance(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let current = self.delay;
        self.attempts += 1;
        let next_ms = (self.delay.as_millis() as f64 * self.policy.multiplier)
            .min(self.policy.max.as_millis() as f64);
        self.delay = Duration::from_millis(next_ms as u64);
        Some(current)
    }
}
