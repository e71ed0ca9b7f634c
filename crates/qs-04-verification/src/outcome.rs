//! Results returned by engine operations.

use crate::errors::VerificationFailure;
use qs_03_admission::{AdmissionRejection, DropReason, PositionNotice, QueuePlacement};
use shared_types::{Channel, PrincipalId, RemoteId, SessionTag, Ticket, Timestamp};

/// A request superseded by a newer issuance. Its queued deliveries and
/// retraction targets must be cleaned up by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidated {
    pub ticket: Ticket,
    pub principal: PrincipalId,
    pub remote: RemoteId,
}

/// A freshly issued code, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub ticket: Ticket,
    pub principal: PrincipalId,
    pub remote: RemoteId,
    pub code: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub invalidated: Vec<Invalidated>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued(Issued),
    Queued(QueuePlacement),
    Rejected(AdmissionRejection),
}

/// Best-effort work that follows a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Delete every delivered copy of the code.
    Retract { ticket: Ticket },
    /// Set the member's group card.
    SyncDisplayName { remote: RemoteId, card: String },
    /// Tell the group who bound which account.
    AnnounceBound {
        principal: PrincipalId,
        remote: RemoteId,
    },
}

/// The bound pair, for the caller to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub ticket: Ticket,
    pub principal: PrincipalId,
    pub remote: RemoteId,
    pub session_tag: SessionTag,
    pub channel: Channel,
    /// Wrong codes submitted before the right one.
    pub attempts: u32,
    pub side_effects: Vec<SideEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Verified(Verified),
    /// Wrong code; the request stays live.
    Retry { ticket: Ticket, remaining: u32 },
    Failed(VerificationFailure),
}

/// Result of a timeout sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepEvent {
    RequestExpired {
        ticket: Ticket,
        principal: PrincipalId,
        remote: RemoteId,
    },
    ConfirmationExpired {
        principal: PrincipalId,
    },
    QueueExpired {
        principal: PrincipalId,
    },
}

/// Result of draining the admission queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEvent {
    Issued(Issued),
    Dropped {
        principal: PrincipalId,
        reason: DropReason,
    },
    Position(PositionNotice),
}

/// Group membership of a remote account, as far as the caller knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Member,
    NotMember,
    /// Member list not loaded yet.
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub live_requests: usize,
    pub pending_confirmations: usize,
    pub queued: usize,
    pub active: usize,
    pub issued_total: u64,
    pub verified_total: u64,
}
