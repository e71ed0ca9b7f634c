//! Ports for the transport.

pub mod outbound;
