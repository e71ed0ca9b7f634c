//! # QS-06 Outbound Send Queue
//!
//! FIFO of pending code deliveries. The platform throttles bots that post
//! in bursts, so at most one delivery leaves per `interval_secs`.
//!
//! ```text
//! enqueue ─▶ [d3][d2][d1] ─next_due (1 per interval)─▶ send
//!               ▲                                        │ failed reply
//!               └──────── attempt + 1 (< max) ───────────┘
//!                                      │ attempt == max or age > max_age
//!                                      ▼
//!                                  Abandoned
//! ```
//!
//! A ticket fanned out to several groups is only reported as exhausted
//! once none of its deliveries is queued, in flight or sent.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod queue;
mod types;


pub use config::SendQueueConfig;
pub use queue::SendQueue;
pub use types::{AbandonReason, Abandoned, Delivery, FailureOutcome, SendQueueStats, Tick};
