//! Retraction types.

use shared_types::{MessageId, Ticket, Timestamp};

/// How a ticket ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Verified,
    /// Expired, exhausted, abandoned or invalidated.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractReason {
    /// The ticket ended.
    Terminal,
    SoftTimer,
    HardTimer,
    /// Id arrived after the ticket ended.
    LateArrival,
    /// Id for a ticket that is no longer tracked.
    Orphan,
    /// A previous delete failed.
    Retry,
}

/// One `delete_msg` to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRequest {
    pub ticket: Ticket,
    pub message_id: MessageId,
    pub reason: RetractReason,
}

/// Armed deadlines for one ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    pub soft_at: Option<Timestamp>,
    pub hard_at: Option<Timestamp>,
}

impl Timers {
    pub fn is_armed(&self) -> bool {
        self.soft_at.is_some() || self.hard_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetractionStats {
    pub tracked_tickets: usize,
    pub undeleted_messages: usize,
    pub deleted_total: u64,
    pub failed_total: u64,
}
