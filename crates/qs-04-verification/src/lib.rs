//! # QS-04 Verification Engine
//!
//! Owns the per-principal binding flow and the one-time codes.
//!
//! ## Binding Flow
//!
//! ```text
//! begin ─▶ AwaitingInput ─submit_remote_id─▶ AwaitingConfirmation
//!                                                │ confirm
//!                           ┌────────────────────┼──────────────────┐
//!                           ▼                    ▼                  ▼
//!                       Rejected              Queued ─drain─▶ AwaitingCode
//!                                                                   │ redeem
//!                                                                   ▼
//!                                                                 Bound
//! ```
//!
//! ## Request Lifecycle
//!
//! `NoRequest → Pending → {Verified, Expired, Exhausted}`
//!
//! | Rule | Value |
//! |------|-------|
//! | Code | 6 uniform random digits |
//! | Validity | 60 s |
//! | Attempts | 3 wrong codes, then `Exhausted` and remote cooldown |
//! | Live requests | at most one per principal and one per remote |
//! | Redemption | channel-agnostic, succeeds at most once per code |
//!
//! A successful redemption returns the bound pair plus the side effects the
//! caller must run (retract, display-name sync, announcement). None of them
//! can roll back the verification.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod code;
mod config;
mod engine;
mod errors;
mod outcome;
mod request;

#[cfg(test)]
mod tests;

pub use code::{is_well_formed, CodeGenerator, RandomCodeGenerator, CODE_LENGTH};
#[cfg(any(test, feature = "test-utils"))]
pub use code::ScriptedCodeGenerator;
pub use config::VerificationConfig;
pub use engine::VerificationEngine;
pub use errors::{FlowError, VerificationFailure};
pub use outcome::{
    DrainEvent, EngineStats, Invalidated, IssueOutcome, Issued, Membership, RedeemOutcome,
    SideEffect, SweepEvent, Verified,
};
pub use request::{BindingStage, PendingConfirmation, VerificationRequest};
