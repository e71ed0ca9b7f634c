//! Verification error types.

use shared_types::{RemoteId, Ticket};
use thiserror::Error;

/// Why a redemption did not verify. Surfaced to the redeemer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("No active verification request")]
    NoActiveRequest,

    /// The request belongs to a different session of the principal.
    #[error("This code was issued to a different session")]
    IdentityMismatch,

    #[error("Verification code expired, request a new one")]
    Expired { ticket: Ticket },

    #[error("Verification codes are exactly 6 digits")]
    InvalidFormat,

    #[error("Verification code already used")]
    AlreadyUsed,

    #[error("Too many wrong codes, account {remote} is locked for {cooldown_secs}s")]
    Exhausted {
        ticket: Ticket,
        remote: RemoteId,
        cooldown_secs: u64,
    },
}

impl VerificationFailure {
    /// Ticket of the request this failure ended, if it ended one.
    pub fn ended_ticket(&self) -> Option<Ticket> {
        match self {
            VerificationFailure::Expired { ticket }
            | VerificationFailure::Exhausted { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }
}

/// Errors in the steps before a code is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("'{input}' is not a valid account number (5-11 digits)")]
    InvalidRemoteId { input: String },

    #[error("Account {remote} is already bound to another player")]
    RemoteAlreadyBound { remote: RemoteId },

    #[error("Account {remote} is not a member of the group")]
    NotGroupMember { remote: RemoteId },

    #[error("No account is waiting for confirmation")]
    NoPendingConfirmation,

    #[error("Confirmation timed out, enter the account again")]
    ConfirmationExpired,

    #[error("A verification is already in progress")]
    VerificationInProgress,
}
