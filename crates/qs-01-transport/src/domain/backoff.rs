//! Exponential reconnect backoff with a pin-and-reset ceiling.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect delay policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial_secs: f64,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Ceiling, also the pinned delay once `pin_after` is exceeded.
    pub max_secs: f64,
    /// Failures tolerated before pinning at `max_secs` and resetting.
    pub pin_after: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_secs: 1.0,
            multiplier: 1.5,
            max_secs: 30.0,
            pin_after: 5,
        }
    }
}

/// Consecutive-failure tracker producing the next reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    consecutive_failures: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
            current: Duration::ZERO,
        }
    }

    /// Record one failed connection attempt and return how long to wait.
    ///
    /// Grows geometrically for the first `pin_after` failures. The next
    /// failure returns `max_secs` and resets the counter, so a long outage
    /// settles into a steady retry instead of hot-looping or growing forever.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures += 1;

        let secs = if self.consecutive_failures > self.policy.pin_after {
            self.consecutive_failures = 0;
            self.policy.max_secs
        } else {
            let exponent = (self.consecutive_failures - 1) as i32;
            let grown = self.policy.initial_secs * self.policy.multiplier.powi(exponent);
            grown.min(self.policy.max_secs)
        };

        self.current = Duration::from_secs_f64(secs.max(0.0));
        self.current
    }

    /// Connection established.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.current = Duration::ZERO;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Most recently returned delay, zero after `reset`.
    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
