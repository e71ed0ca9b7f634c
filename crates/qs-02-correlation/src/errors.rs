//! Correlation errors.

use thiserror::Error;

/// An awaited reply never arrived. The call may or may not have taken
/// effect on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    /// The caller stopped waiting.
    #[error("No reply within {after_ms}ms, outcome unknown")]
    Timeout { after_ms: u64 },

    /// The registry reaped or cancelled the call.
    #[error("Call discarded before a reply arrived, outcome unknown")]
    Discarded,
}
