//! Retry strategies shared by file I/O and the backend client.
//!
//! A strategy only answers two questions: how many attempts are allowed and
//! how long to wait after a failed attempt. The loops themselves live next to
//! the operation they retry so that each can log in its own terms.

use std::time::Duration;

pub trait RetryStrategy: Send + Sync {
    /// Total number of attempts, including the first one. Never zero.
    fn max_attempts(&self) -> u32;

    /// Delay before the next attempt after `attempt` (1-based) failed.
    fn delay(&self, attempt: u32) -> Duration;

    fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}

/// Same pause between every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub attempts: u32,
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(100))
    }
}

impl RetryStrategy for FixedDelay {
    fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Doubling delay capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial,
            max,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(5))
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial.saturating_mul(1 << shift).min(self.max)
    }
}

/// Single attempt, no waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn max_attempts(&self) -> u32 {
        1
    }

    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}
