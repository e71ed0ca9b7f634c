//! # Bridge Runtime
//!
//! Binds game players to group-chat accounts through one-time codes, and
//! relays chat between the game and the groups.
//!
//! ## Binding Flow
//!
//! ```text
//! request_binding ─▶ submit_remote_id ─▶ confirm ─┬─▶ Issued ─▶ send queue ─▶ group
//!                    (membership, nick)           ├─▶ Queued (admission)
//!                                                 └─▶ Rejected (rate / cooldown)
//!
//! code typed in game  ─┐
//!                      ├─▶ redeem ─▶ Verified ─▶ store.set, retract, card, announce
//! code posted in group ┘
//! ```
//!
//! ## Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `qs-01-transport` | WebSocket connection, reconnect backoff |
//! | `qs-02-correlation` | echo tokens, reply matching, timeouts |
//! | `qs-03-admission` | concurrency slots, FIFO queue, rate limits |
//! | `qs-04-verification` | code issuance and redemption |
//! | `qs-05-retraction` | deletion of delivered code messages |
//! | `qs-06-send-queue` | throttled code delivery |
//!
//! ## Concurrency
//!
//! All mutable component state sits behind one `parking_lot::Mutex`. The
//! lock is never held across an `.await`; notices to players are gathered
//! under the lock and delivered after it is released.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bridge::{parse_group_command, Bridge, BridgeService, BridgeStats, GroupCommand};
pub use config::{BridgeConfig, ConfigError, RelayConfig, TimerConfig};
pub use domain::{BridgeState, Notice};
pub use errors::BridgeError;
pub use ports::{BindingStore, BridgePorts, PrincipalDirectory, PrincipalNotifier, StoreError};
