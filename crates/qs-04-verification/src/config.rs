//! Verification configuration.

use serde::{Deserialize, Serialize};
use shared_types::MILLIS_PER_SEC;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// How long an issued code stays redeemable.
    pub code_ttl_secs: u64,
    /// Wrong codes allowed before the request is exhausted.
    pub max_attempts: u32,
    /// How long an entered account waits for confirmation.
    pub confirmation_ttl_secs: u64,
    /// Set the bound member's group card to the principal name on success.
    pub sync_display_name: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 60,
            max_attempts: 3,
            confirmation_ttl_secs: 60,
            sync_display_name: true,
        }
    }
}

impl VerificationConfig {
    pub(crate) fn code_ttl_ms(&self) -> u64 {
        self.code_ttl_secs * MILLIS_PER_SEC
    }

    pub(crate) fn confirmation_ttl_ms(&self) -> u64 {
        self.confirmation_ttl_secs * MILLIS_PER_SEC
    }
}
