//! Pure transport domain: reconnect policy, connection state, config, errors.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod errors;
