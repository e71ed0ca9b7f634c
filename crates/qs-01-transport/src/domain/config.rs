//! Transport configuration.

use super::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// OneBot forward WebSocket endpoint.
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub access_token: Option<String>,
    /// Keep-alive period.
    pub heartbeat_interval_secs: u64,
    /// Frames accepted for sending before `send` reports backpressure.
    pub outbound_buffer: usize,
    pub backoff: BackoffPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001".to_string(),
            access_token: None,
            heartbeat_interval_secs: 30,
            outbound_buffer: 256,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl TransportConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Token, ignoring an empty string.
    pub fn bearer_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.bearer_token(), None);
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let config = TransportConfig {
            access_token: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.bearer_token(), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"url":"ws://napcat:3001","backoff":{"max_secs":10.0}}"#)
                .unwrap();
        assert_eq!(config.url, "ws://napcat:3001");
        assert_eq!(config.backoff.max_secs, 10.0);
        assert_eq!(config.backoff.pin_after, 5);
        assert_eq!(config.heartbeat_interval_secs, 30);
    }
}
