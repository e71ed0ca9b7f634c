//! Admission configuration.

use serde::{Deserialize, Serialize};
use shared_types::MILLIS_PER_SEC;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Minimum gap between two issuances for one principal.
    pub principal_cooldown_secs: u64,
    /// Lockout for a remote account after a failed or abandoned attempt.
    pub remote_cooldown_secs: u64,
    /// Length of the trailing issuance window.
    pub window_secs: u64,
    /// Issuances allowed per window.
    pub max_per_window: usize,
    /// Principals allowed mid-verification at once.
    pub max_concurrent: usize,
    /// Queue entries older than this are dropped.
    pub queue_ttl_secs: u64,
    /// Heads admitted per drain tick.
    pub drain_batch: usize,
    /// Seconds of estimated wait per queue position.
    pub wait_per_position_secs: u64,
    /// Only this many leading positions receive a position notice.
    pub position_notice_limit: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            principal_cooldown_secs: 60,
            remote_cooldown_secs: 10,
            window_secs: 60,
            max_per_window: 30,
            max_concurrent: 25,
            queue_ttl_secs: 300,
            drain_batch: 3,
            wait_per_position_secs: 4,
            position_notice_limit: 5,
        }
    }
}

impl AdmissionConfig {
    pub(crate) fn principal_cooldown_ms(&self) -> u64 {
        self.principal_cooldown_secs * MILLIS_PER_SEC
    }

    pub(crate) fn remote_cooldown_ms(&self) -> u64 {
        self.remote_cooldown_secs * MILLIS_PER_SEC
    }

    pub(crate) fn window_ms(&self) -> u64 {
        self.window_secs * MILLIS_PER_SEC
    }

    pub(crate) fn queue_ttl_ms(&self) -> u64 {
        self.queue_ttl_secs * MILLIS_PER_SEC
    }

    /// `max(1, (position - 1) * wait_per_position_secs)`.
    pub fn estimated_wait_secs(&self, position: usize) -> u64 {
        let ahead = position.saturating_sub(1) as u64;
        (ahead * self.wait_per_position_secs).max(1)
    }
}
