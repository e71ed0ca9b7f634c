//! # QS-01 Transport
//!
//! One persistent outbound WebSocket connection to a OneBot v11 endpoint.
//!
//! ## Architecture
//!
//! ```text
//!  TransportHandle (FrameSink)          WsTransport::start()
//!        │ try_send                           │
//!        ▼                                    ▼
//!  ┌───────────┐   ┌─────────────────────────────────────────┐
//!  │ outbound  │──▶│ connection_loop                         │
//!  │  mpsc     │   │   connect ─▶ run (select!)              │
//!  └───────────┘   │     ├─ outbound frame ─▶ ws write       │
//!                  │     ├─ heartbeat tick  ─▶ "{}"          │
//!                  │     ├─ ws read ─▶ TransportEvent::Frame │
//!                  │     └─ shutdown ─▶ Close                │
//!                  │   failure ─▶ Backoff::record_failure    │
//!                  │           ─▶ sleep ─▶ reconnect         │
//!                  └─────────────────────────────────────────┘
//! ```
//!
//! ## Reconnect Policy
//!
//! | Consecutive failure | Delay |
//! |---------------------|-------|
//! | 1 | 1 s |
//! | 2 | 1.5 s |
//! | 3 | 2.25 s |
//! | 4 | 3.375 s |
//! | 5 | 5.0625 s |
//! | 6 | 30 s, counter reset |
//!
//! A successful connect resets the counter. Transport errors are never
//! fatal; the loop only ends on `stop()`.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::ws::{TransportEvent, TransportHandle, WsTransport};
pub use domain::backoff::{Backoff, BackoffPolicy};
pub use domain::config::TransportConfig;
pub use domain::connection::{ConnectionState, ConnectionStatus};
pub use domain::errors::TransportError;
pub use ports::outbound::FrameSink;
