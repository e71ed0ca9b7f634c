//! # QQSync Test Suite
//!
//! Tests that span more than one crate.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── scenarios.rs   # verification, admission and retraction together
//!     └── e2e_bridge.rs  # full bridge against a local OneBot WebSocket server
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qs-tests
//! cargo test -p qs-tests integration::e2e_bridge::
//! ```

pub mod integration;
