//! Send queue configuration.

use serde::{Deserialize, Serialize};
use shared_types::MILLIS_PER_SEC;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendQueueConfig {
    /// Minimum gap between two sends. Values below 2 are raised to 2.
    pub interval_secs: u64,
    pub max_attempts: u32,
    /// Deliveries older than this are dropped without retry.
    pub max_age_secs: u64,
}

impl Default for SendQueueConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            max_attempts: 3,
            max_age_secs: 60,
        }
    }
}

impl SendQueueConfig {
    pub const MIN_INTERVAL_SECS: u64 = 2;

    pub(crate) fn interval_ms(&self) -> u64 {
        self.interval_secs.max(Self::MIN_INTERVAL_SECS) * MILLIS_PER_SEC
    }

    pub(crate) fn max_age_ms(&self) -> u64 {
        self.max_age_secs * MILLIS_PER_SEC
    }
}
