//! Transport error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Network and connection errors. Always retried, never fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live connection; the frame was not accepted.
    #[error("Not connected")]
    NotConnected,

    /// Outbound buffer is full.
    #[error("Outbound buffer full")]
    Backpressure,

    /// The connection task has exited.
    #[error("Transport closed")]
    Closed,

    #[error("Transport already started")]
    AlreadyStarted,

    #[error("Access token is not a valid header value")]
    InvalidToken,

    #[error("Frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Heartbeat failed: {0}")]
    Heartbeat(tungstenite::Error),

    #[error("Connection closed by peer: {reason}")]
    ClosedByPeer { reason: String },
}
