//! Send queue types.

use shared_types::{GroupId, PrincipalId, RemoteId, Ticket, Timestamp};

/// One code message bound for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub ticket: Ticket,
    pub principal: PrincipalId,
    pub remote: RemoteId,
    pub group: GroupId,
    pub code: String,
    /// 1-based.
    pub attempt: u32,
    pub enqueued_at: Timestamp,
}

impl Delivery {
    pub fn new(
        ticket: Ticket,
        principal: PrincipalId,
        remote: RemoteId,
        group: GroupId,
        code: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            ticket,
            principal,
            remote,
            group,
            code: code.into(),
            attempt: 1,
            enqueued_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    Attempts,
    Stale,
}

/// A delivery the queue gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abandoned {
    pub delivery: Delivery,
    pub reason: AbandonReason,
    /// No other delivery of the ticket is pending or succeeded: the
    /// principal never got the code.
    pub ticket_exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Requeued { attempt: u32 },
    GaveUp(Abandoned),
    /// The ticket was removed while the send was in flight.
    Cancelled,
}

/// Result of one drain tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tick {
    pub send: Option<Delivery>,
    pub abandoned: Vec<Abandoned>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendQueueStats {
    pub queued: usize,
    pub tickets_outstanding: usize,
    pub sent_total: u64,
    pub abandoned_total: u64,
}
