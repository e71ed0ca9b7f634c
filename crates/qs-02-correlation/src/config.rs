//! Correlation configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Unanswered calls are reaped after this long.
    pub ttl_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CorrelationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
