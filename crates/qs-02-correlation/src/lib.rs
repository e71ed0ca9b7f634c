//! # QS-02 Correlation Registry
//!
//! Outbound calls that expect a reply carry an echo token
//! `<call-kind-prefix>:<uuid-v7>`. The platform round-trips it on the
//! response frame, and the registry maps it back to the call's context.
//!
//! ## Flow
//!
//! 1. Caller builds an action and calls `register()` (or
//!    `register_awaiting()` to also get a oneshot receiver).
//! 2. The frame is sent with the token as `echo`.
//! 3. The frame router calls `resolve()` with each response.
//! 4. Unanswered calls are reaped by `reap_expired()`; awaiting callers
//!    observe `CorrelationError::Discarded` and must treat the outcome as
//!    unknown.
//!
//! ## Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | Tokens never reused while live | UUID v7 per registration |
//! | At most one resolution per token | `DashMap::remove` is the only resolve path |
//! | Duplicates are ignored | resolved tokens kept as tombstones for one TTL |
//! | Bounded memory | `reap_expired` drops calls and tombstones after TTL |

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod registry;
pub mod token;

pub use config::CorrelationConfig;
pub use errors::CorrelationError;
pub use registry::{
    await_response, CorrelationRegistry, CorrelationStats, ExpiredCall, Resolution, ResolvedCall,
    StatsSnapshot,
};
pub use token::EchoToken;
