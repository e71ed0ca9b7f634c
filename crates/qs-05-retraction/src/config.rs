//! Retraction configuration.

use serde::{Deserialize, Serialize};
use shared_types::MILLIS_PER_SEC;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetractionConfig {
    pub soft_after_secs: u64,
    /// Safety net; retries anything not yet confirmed deleted.
    pub hard_after_secs: u64,
    /// The platform refuses deletes after this long.
    pub platform_window_secs: u64,
    /// Immediate retries of a failed delete once the ticket has ended.
    pub max_delete_attempts: u32,
}

impl Default for RetractionConfig {
    fn default() -> Self {
        Self {
            soft_after_secs: 90,
            hard_after_secs: 105,
            platform_window_secs: 120,
            max_delete_attempts: 3,
        }
    }
}

impl RetractionConfig {
    pub(crate) fn soft_after_ms(&self) -> u64 {
        self.soft_after_secs * MILLIS_PER_SEC
    }

    pub(crate) fn hard_after_ms(&self) -> u64 {
        self.hard_after_secs * MILLIS_PER_SEC
    }

    pub(crate) fn window_ms(&self) -> u64 {
        self.platform_window_secs * MILLIS_PER_SEC
    }

    /// Timers must fire inside the platform window.
    pub fn is_consistent(&self) -> bool {
        self.soft_after_secs <= self.hard_after_secs
            && self.hard_after_secs < self.platform_window_secs
    }
}
