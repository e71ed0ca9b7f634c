//! Adapters: the tokio-tungstenite client.

pub mod ws;
