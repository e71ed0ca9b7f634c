//! # Error Types
//!
//! Errors raised while decoding frames at the wire boundary.

use thiserror::Error;

/// A text frame could not be turned into an `InboundFrame`.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not valid JSON at all.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,
}
