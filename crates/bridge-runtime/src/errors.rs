//! Bridge error types.

use crate::ports::StoreError;
use qs_01_transport::TransportError;
use qs_04_verification::FlowError;
use shared_types::PrincipalId;
use thiserror::Error;

/// Errors returned by the game-facing API. User-visible outcomes are also
/// sent to the principal as notices.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("Principal {principal} is not online")]
    PrincipalOffline { principal: PrincipalId },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Bridge already started")]
    AlreadyStarted,
}
