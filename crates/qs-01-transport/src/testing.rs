//! In-memory `FrameSink` for tests.

use crate::domain::errors::TransportError;
use crate::ports::outbound::FrameSink;
use parking_lot::Mutex;
use shared_types::OutboundFrame;
use std::sync::atomic::{AtomicBool, Ordering};

/// Records every accepted frame. Toggle `set_connected(false)` to simulate
/// an outage.
pub struct RecordingSink {
    connected: AtomicBool,
    sent: Mutex<Vec<OutboundFrame>>,
}

impl RecordingSink {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        let sink = Self::connected();
        sink.set_connected(false);
        sink
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Frames sent so far, oldest first.
    pub fn sent(&self) -> Vec<OutboundFrame> {
        self.sent.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<OutboundFrame> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Frames for one action name.
    pub fn sent_action(&self, action: &str) -> Vec<OutboundFrame> {
        self.sent
            .lock()
            .iter()
            .filter(|frame| frame.action == action)
            .cloned()
            .collect()
    }
}

impl FrameSink for RecordingSink {
    fn send(&self, frame: &OutboundFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(frame.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
