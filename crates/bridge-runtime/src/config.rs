//! # Bridge Configuration
//!
//! Unified configuration for every component and the runtime itself.
//!
//! Loaded from an optional JSON file (`QS_CONFIG`), then overridden by
//! environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QS_WS_URL` | `transport.url` |
//! | `QS_ACCESS_TOKEN` | `transport.access_token` |
//! | `QS_GROUPS` | `groups` (comma separated) |
//! | `QS_MAX_CONCURRENT` | `admission.max_concurrent` |
//! | `QS_BINDINGS_FILE` | `binding_store_path` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use qs_01_transport::TransportConfig;
use qs_02_correlation::CorrelationConfig;
use qs_03_admission::AdmissionConfig;
use qs_04_verification::VerificationConfig;
use qs_05_retraction::RetractionConfig;
use qs_06_send_queue::SendQueueConfig;
use serde::{Deserialize, Serialize};
use shared_types::GroupId;
use thiserror::Error;
use tracing::info;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Group chats the bridge serves. Codes are delivered to, and redeemed
    /// from, these groups only.
    pub groups: Vec<GroupId>,
    pub transport: TransportConfig,
    pub correlation: CorrelationConfig,
    pub admission: AdmissionConfig,
    pub verification: VerificationConfig,
    pub retraction: RetractionConfig,
    pub send_queue: SendQueueConfig,
    pub relay: RelayConfig,
    pub timers: TimerConfig,
    /// Posted once to every group after the first successful connect.
    pub startup_notice: Option<String>,
    /// How long to wait for a `get_stranger_info` reply.
    pub profile_timeout_secs: u64,
    /// JSON file for the binding table; in-memory when unset.
    pub binding_store_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            transport: TransportConfig::default(),
            correlation: CorrelationConfig::default(),
            admission: AdmissionConfig::default(),
            verification: VerificationConfig::default(),
            retraction: RetractionConfig::default(),
            send_queue: SendQueueConfig::default(),
            relay: RelayConfig::default(),
            timers: TimerConfig::default(),
            startup_notice: None,
            profile_timeout_secs: 5,
            binding_store_path: None,
        }
    }
}

/// Chat relay between the game and the groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    /// Prepended to game chat lines posted in the groups.
    pub game_prefix: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            game_prefix: "[Game]".to_string(),
        }
    }
}

/// Periods of the background tasks, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub admission_ms: u64,
    pub send_queue_ms: u64,
    pub retraction_ms: u64,
    pub side_effects_ms: u64,
    pub cleanup_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            admission_ms: 1_000,
            send_queue_ms: 1_000,
            retraction_ms: 1_000,
            side_effects_ms: 1_000,
            cleanup_ms: 10_000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("No group configured; set `groups` or QS_GROUPS")]
    NoGroups,

    #[error("Transport url must start with ws:// or wss://, got '{0}'")]
    InvalidUrl(String),

    #[error("Retraction timers must satisfy soft <= hard < platform window")]
    InvalidRetractionTimers,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl BridgeConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load from `QS_CONFIG` (if set) and the process environment, then
    /// validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("QS_CONFIG") {
            Ok(path) if !path.is_empty() => {
                info!(path = %path, "Loading configuration file");
                Self::from_file(Path::new(&path))?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("QS_WS_URL") {
            self.transport.url = url;
        }
        if let Some(token) = lookup("QS_ACCESS_TOKEN") {
            self.transport.access_token = Some(token);
        }
        if let Some(groups) = lookup("QS_GROUPS") {
            self.groups = parse_groups(&groups).ok_or(ConfigError::InvalidEnv {
                var: "QS_GROUPS",
                value: groups,
            })?;
        }
        if let Some(limit) = lookup("QS_MAX_CONCURRENT") {
            self.admission.max_concurrent =
                limit.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "QS_MAX_CONCURRENT",
                    value: limit.clone(),
                })?;
        }
        if let Some(path) = lookup("QS_BINDINGS_FILE") {
            self.binding_store_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }
        let url = self.transport.url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(self.transport.url.clone()));
        }
        if !self.retraction.is_consistent() {
            return Err(ConfigError::InvalidRetractionTimers);
        }
        if self.admission.max_concurrent == 0 {
            return Err(ConfigError::Zero("admission.max_concurrent"));
        }
        if self.admission.max_per_window == 0 {
            return Err(ConfigError::Zero("admission.max_per_window"));
        }
        if self.verification.max_attempts == 0 {
            return Err(ConfigError::Zero("verification.max_attempts"));
        }
        if self.send_queue.max_attempts == 0 {
            return Err(ConfigError::Zero("send_queue.max_attempts"));
        }
        Ok(())
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_secs(self.profile_timeout_secs)
    }
}

/// `"123, 456"` to group ids. `None` if any entry is not a number.
fn parse_groups(raw: &str) -> Option<Vec<GroupId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<GroupId>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn valid() -> BridgeConfig {
        BridgeConfig {
            groups: vec![GroupId(100)],
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.profile_timeout(), Duration::from_secs(5));
        assert_eq!(config.admission.max_concurrent, 25);
        assert_eq!(config.retraction.soft_after_secs, 90);
        assert_eq!(config.send_queue.interval_secs, 2);
        assert!(config.relay.enabled);
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(matches!(
            BridgeConfig::default().validate(),
            Err(ConfigError::NoGroups)
        ));

        let mut config = valid();
        config.transport.url = "http://localhost".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));

        let mut config = valid();
        config.admission.max_concurrent = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("admission.max_concurrent"))
        ));

        let mut config = valid();
        config.retraction.hard_after_secs = 200;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRetractionTimers)
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QS_WS_URL", "wss://bot.example:6700"),
            ("QS_ACCESS_TOKEN", "secret"),
            ("QS_GROUPS", "111, 222"),
            ("QS_MAX_CONCURRENT", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.transport.url, "wss://bot.example:6700");
        assert_eq!(config.transport.bearer_token(), Some("secret"));
        assert_eq!(config.groups, vec![GroupId(111), GroupId(222)]);
        assert_eq!(config.admission.max_concurrent, 5);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = BridgeConfig::default();
        let result = config.apply_env(|key| (key == "QS_GROUPS").then(|| "12,abc".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { var: "QS_GROUPS", .. })
        ));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "groups": [42], "admission": {{ "max_concurrent": 3 }}, "startup_notice": "online" }}"#
        )
        .unwrap();

        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.groups, vec![GroupId(42)]);
        assert_eq!(config.admission.max_concurrent, 3);
        assert_eq!(config.admission.max_per_window, 30);
        assert_eq!(config.startup_notice.as_deref(), Some("online"));
    }

    #[test]
    fn test_from_file_missing() {
        let result = BridgeConfig::from_file(Path::new("/nonexistent/qqsync.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
