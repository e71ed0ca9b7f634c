//! Admission types.

use shared_types::{PrincipalId, RemoteId, Timestamp};
use thiserror::Error;

/// One waiting principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub principal: PrincipalId,
    pub remote: RemoteId,
    pub enqueued_at: Timestamp,
}

/// Hard rejection. User-visible, not an error state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionRejection {
    #[error("Requested too recently, try again in {remaining_secs}s")]
    PrincipalCooldown { remaining_secs: u64 },

    #[error("Account {remote} is cooling down after a failed attempt, try again in {remaining_secs}s")]
    RemoteCooldown { remote: RemoteId, remaining_secs: u64 },
}

impl AdmissionRejection {
    pub fn remaining_secs(&self) -> u64 {
        match self {
            AdmissionRejection::PrincipalCooldown { remaining_secs }
            | AdmissionRejection::RemoteCooldown { remaining_secs, .. } => *remaining_secs,
        }
    }
}

/// Where a queued principal stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePlacement {
    /// 1-based.
    pub position: usize,
    pub estimated_wait_secs: u64,
    /// False when the principal was already waiting.
    pub newly_enqueued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allow,
    Rejected(AdmissionRejection),
    Queued(QueuePlacement),
}

/// Which capacity limit is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityLimit {
    Window,
    Concurrency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Waited longer than the queue TTL.
    Expired,
    /// Principal left the game.
    Offline,
}

/// "You are now at position N" for one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionNotice {
    pub principal: PrincipalId,
    pub position: usize,
    pub estimated_wait_secs: u64,
}

/// Result of one drain tick.
#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// Dequeued heads, in order. The caller issues their codes.
    pub admitted: Vec<QueueEntry>,
    pub dropped: Vec<(QueueEntry, DropReason)>,
    pub notices: Vec<PositionNotice>,
}

impl DrainOutcome {
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty() && self.dropped.is_empty() && self.notices.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    pub active: usize,
    pub queued: usize,
    pub issued_in_window: usize,
    pub cooling_remotes: usize,
}
