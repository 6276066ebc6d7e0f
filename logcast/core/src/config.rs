//! Broadcast Configuration
//!
//! Tunables for the log store and subscriber sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default live-line capacity of each subscriber queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default pause between two messages sent to one viewer
pub const DEFAULT_THROTTLE_MS: u64 = 1000;

/// Default history length at which the store logs a warning
pub const DEFAULT_HISTORY_WARN_LINES: usize = 100_000;

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field that must be positive was zero
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    /// An environment variable could not be parsed
    #[error("environment variable {name}={value:?} is not a valid number")]
    InvalidEnv {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Configuration for the broadcast engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Lines a subscriber may fall behind before it is evicted
    pub queue_capacity: usize,

    /// Pause after each message sent to a viewer, in milliseconds
    pub throttle_ms: u64,

    /// History length that triggers a one-time warning per buffer
    ///
    /// Histories are never truncated; this only makes runaway producers
    /// visible in the logs.
    pub history_warn_lines: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            throttle_ms: DEFAULT_THROTTLE_MS,
            history_warn_lines: DEFAULT_HISTORY_WARN_LINES,
        }
    }
}

impl BroadcastConfig {
    /// Apply environment variable overrides on top of `self`
    ///
    /// Environment variables:
    /// - `LOGCAST_QUEUE_CAPACITY`: per-subscriber queue capacity
    /// - `LOGCAST_THROTTLE_MS`: pause between messages to one viewer
    /// - `LOGCAST_HISTORY_WARN_LINES`: history warning threshold
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_number("LOGCAST_QUEUE_CAPACITY")? {
            self.queue_capacity = v;
        }
        if let Some(v) = env_number("LOGCAST_THROTTLE_MS")? {
            self.throttle_ms = v;
        }
        if let Some(v) = env_number("LOGCAST_HISTORY_WARN_LINES")? {
            self.history_warn_lines = v;
        }
        Ok(self)
    }

    /// Check invariants the store relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if self.history_warn_lines == 0 {
            return Err(ConfigError::Zero("history_warn_lines"));
        }
        Ok(())
    }

    /// Throttle interval as a `Duration`
    #[must_use]
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

fn env_number<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BroadcastConfig::default();
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.throttle(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = BroadcastConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("queue_capacity")));
    }

    #[test]
    fn test_zero_throttle_allowed() {
        let config = BroadcastConfig {
            throttle_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.throttle(), Duration::ZERO);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: BroadcastConfig = serde_json::from_str(r#"{"throttle_ms": 250}"#).unwrap();
        assert_eq!(config.throttle_ms, 250);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }
}
