//! # Shared Types Crate
//!
//! Identifiers, wire frames and the clock port used by all bridge subsystems.
//!
//! ## Layout
//!
//! - **entities**: principal / remote / group identifiers, issuance tickets,
//!   redemption channels.
//! - **frames**: OneBot v11 outbound action frames and inbound
//!   response/event frames.
//! - **payload**: call kinds (echo prefixes) and the typed discriminator that
//!   classifies response payloads once, at the boundary.
//! - **time**: millisecond timestamps and the `TimeSource` port.
//!
//! ## Design Principles
//!
//! - Frames are parsed exactly once in `InboundFrame::parse`; nothing
//!   downstream inspects raw JSON keys.
//! - Domain crates take `now: Timestamp` as a parameter and never read the
//!   wall clock themselves.

pub mod entities;
pub mod errors;
pub mod frames;
pub mod payload;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use frames::*;
pub use payload::*;
pub use time::*;
