//! # QS-03 Admission Controller
//!
//! Decides whether a verification code may be issued now, must wait in the
//! overflow queue, or is rejected outright.
//!
//! ## Decision Order
//!
//! 1. **Principal cooldown**: one issuance per principal per 60 s. A
//!    cancelled confirmation also starts it.
//! 2. **Remote cooldown**: 10 s after a failed or abandoned attempt on the
//!    same remote account.
//! 3. **Capacity**: trailing-window issuance cap and concurrency cap. A
//!    non-empty queue also blocks newcomers so admission stays FIFO.
//! 4. **Queue**: capacity-blocked principals are enqueued once and told
//!    their position and `max(1, (position - 1) * interval)` seconds wait.
//!
//! ## Draining
//!
//! `drain()` runs once per tick and admits at most `drain_batch` heads.
//! Expired and offline heads are dropped; a blocked head stops the drain
//! (head-of-line). Each principal in the first `position_notice_limit`
//! slots receives at most one position notice.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod controller;
mod types;


pub use config::AdmissionConfig;
pub use controller::AdmissionController;
pub use types::{
    AdmissionDecision, AdmissionRejection, AdmissionStats, CapacityLimit, DrainOutcome,
    DropReason, PositionNotice, QueueEntry, QueuePlacement,
};
