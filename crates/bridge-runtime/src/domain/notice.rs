//! Messages for players.

use qs_03_admission::{AdmissionRejection, DropReason};
use qs_04_verification::{FlowError, VerificationFailure};
use shared_types::RemoteId;
use std::fmt;

/// Everything the bridge tells a principal. `Display` gives a default
/// English rendering; hosts may match on the variant instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Ask for the remote account number.
    PromptRemoteId,
    /// Ask the principal to confirm the account.
    ConfirmRemote {
        remote: RemoteId,
        display_name: String,
    },
    CodeIssued {
        remote: RemoteId,
        expires_in_secs: u64,
        groups: usize,
    },
    Queued {
        position: usize,
        estimated_wait_secs: u64,
    },
    QueuePosition {
        position: usize,
        estimated_wait_secs: u64,
    },
    QueueDropped(DropReason),
    Rejected(AdmissionRejection),
    Flow(FlowError),
    WrongCode {
        remaining: u32,
    },
    Failed(VerificationFailure),
    /// A newer code replaced this principal's code.
    Superseded,
    CodeExpired,
    DeliveryFailed,
    Bound {
        remote: RemoteId,
    },
    Unbound {
        remote: RemoteId,
    },
    Cancelled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PromptRemoteId => write!(f, "Enter the QQ account you want to bind"),
            Notice::ConfirmRemote {
                remote,
                display_name,
            } => write!(f, "Bind account {remote} ({display_name})? Confirm to continue"),
            Notice::CodeIssued {
                expires_in_secs, ..
            } => write!(
                f,
                "A verification code was sent to the group, enter it within {expires_in_secs}s"
            ),
            Notice::Queued {
                position,
                estimated_wait_secs,
            } => write!(
                f,
                "Verification is busy, you are number {position} in line (about {estimated_wait_secs}s)"
            ),
            Notice::QueuePosition {
                position,
                estimated_wait_secs,
            } => write!(
                f,
                "You are now number {position} in line (about {estimated_wait_secs}s)"
            ),
            Notice::QueueDropped(DropReason::Expired) => {
                write!(f, "You waited too long in line, please try again")
            }
            Notice::QueueDropped(DropReason::Offline) => write!(f, "Removed from the line"),
            Notice::Rejected(rejection) => write!(f, "{rejection}"),
            Notice::Flow(error) => write!(f, "{error}"),
            Notice::WrongCode { remaining } => {
                write!(f, "Wrong code, {remaining} attempt(s) left")
            }
            Notice::Failed(failure) => write!(f, "{failure}"),
            Notice::Superseded => write!(f, "Your code was replaced by a newer request"),
            Notice::CodeExpired => write!(f, "Your verification code expired"),
            Notice::DeliveryFailed => {
                write!(f, "The code could not be delivered, please try again later")
            }
            Notice::Bound { remote } => write!(f, "Bound to account {remote}"),
            Notice::Unbound { remote } => write!(f, "Account {remote} unbound"),
            Notice::Cancelled => write!(f, "Binding cancelled"),
        }
    }
}
