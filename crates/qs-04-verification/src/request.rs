//! Per-principal records.

use shared_types::{PrincipalId, RemoteId, SessionTag, Ticket, Timestamp};

/// A live one-time code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub ticket: Ticket,
    pub principal: PrincipalId,
    pub remote: RemoteId,
    pub code: String,
    pub created_at: Timestamp,
    /// Wrong codes submitted so far.
    pub attempts: u32,
    /// Set by the one successful redemption; the request then only lives on
    /// as a spent record.
    pub used: bool,
    /// Only this session may redeem.
    pub session_tag: SessionTag,
}

/// Remote account entered, waiting for the principal to confirm it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub principal: PrincipalId,
    pub remote: RemoteId,
    /// Platform nickname, once the profile lookup answers.
    pub display_name: Option<String>,
    pub created_at: Timestamp,
}

/// Redeemed request (`used` set), kept for one validity window so a racing
/// second redemption reports `AlreadyUsed` instead of `NoActiveRequest`.
#[derive(Debug, Clone)]
pub(crate) struct SpentCode {
    pub request: VerificationRequest,
    pub spent_at: Timestamp,
}

impl SpentCode {
    pub fn rejects(&self, submitted: &str) -> bool {
        self.request.used && self.request.code == submitted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStage {
    AwaitingInput,
    AwaitingConfirmation,
    /// Confirmed, waiting for admission capacity.
    Queued,
    AwaitingCode,
    Bound,
}
