//! Outbound port: where the rest of the bridge hands frames to the wire.

use crate::domain::errors::TransportError;
use shared_types::OutboundFrame;

/// Fire-and-forget frame sink.
///
/// `send` only queues the frame. The outcome of the call itself arrives
/// later as a response frame matched by its echo token.
pub trait FrameSink: Send + Sync {
    /// Queue a frame for the live connection.
    ///
    /// Fails immediately with `NotConnected` while reconnecting so callers
    /// can count it as a delivery failure instead of waiting on a reply that
    /// will never come.
    fn send(&self, frame: &OutboundFrame) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}
