//! # QS-05 Retraction Scheduler
//!
//! Every delivered code message must be deleted before the platform's
//! 120 s recall window closes.
//!
//! ## Timeline (per ticket)
//!
//! ```text
//!  0 s          90 s            105 s          120 s
//!  │ issued      │ soft          │ hard          │ window closed
//!  ├─────────────┼───────────────┼───────────────┤
//!  │ ids arrive  │ delete        │ re-delete     │ entry purged
//!  │ late        │ pending ids   │ everything    │
//! ```
//!
//! | Terminal event | Soft timer | Hard timer | Known ids | Late ids |
//! |----------------|-----------|-----------|-----------|----------|
//! | Verified | cancelled | cancelled | deleted now | deleted on arrival |
//! | Expired / Exhausted / invalidated | cancelled | kept | deleted now | deleted on arrival |
//!
//! Message ids for tickets the scheduler no longer knows are deleted on
//! arrival as long as the platform window is still open.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod scheduler;
mod types;


pub use config::RetractionConfig;
pub use scheduler::RetractionScheduler;
pub use types::{DeleteRequest, RetractReason, RetractionStats, Terminal, Timers};
