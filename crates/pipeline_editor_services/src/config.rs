// SPDX-License-Identifier: MIT OR Apache-2.0
//! Service configuration, stored as RON.

use pipeline_editor_graph::services::MAX_MODEL_BYTES;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading/saving error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File content is not valid RON for the config
    #[error("Invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    /// A value is out of range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// How services are built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Use local placeholder services instead of providers
    pub mock_mode: bool,
    /// Delay mock services wait before answering
    pub simulated_latency_ms: u64,
    /// Delay between video job polls
    pub video_poll_interval_ms: u64,
    /// Polls before a video job is abandoned
    pub video_max_poll_attempts: u32,
    /// Largest accepted model file
    pub max_model_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mock_mode: true,
            simulated_latency_ms: 800,
            video_poll_interval_ms: 2000,
            video_max_poll_attempts: 60,
            max_model_bytes: MAX_MODEL_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Config for tests and headless runs: mock services, no latency
    pub fn immediate() -> Self {
        Self {
            simulated_latency_ms: 0,
            ..Self::default()
        }
    }

    /// Mock service latency
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    /// Video poll interval
    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_millis(self.video_poll_interval_ms)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_max_poll_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "video_max_poll_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_model_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_model_bytes",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Parse and validate a RON document
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert!(config.mock_mode);
        assert_eq!(config.video_max_poll_attempts, 60);
        assert_eq!(config.video_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.max_model_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = ServiceConfig::from_ron("(mock_mode: false, simulated_latency_ms: 5)").unwrap();
        assert!(!config.mock_mode);
        assert_eq!(config.simulated_latency_ms, 5);
        assert_eq!(config.video_max_poll_attempts, 60);
    }

    #[test]
    fn test_saved_config_reloads() {
        let config = ServiceConfig {
            video_max_poll_attempts: 3,
            ..ServiceConfig::immediate()
        };
        let text = config.to_ron().unwrap();
        assert!(text.contains("video_max_poll_attempts: 3"));
        assert_eq!(ServiceConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_zero_poll_attempts_rejected() {
        let err = ServiceConfig::from_ron("(video_max_poll_attempts: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "video_max_poll_attempts", .. }));
    }

    #[test]
    fn test_malformed_file_rejected() {
        assert!(matches!(
            ServiceConfig::from_ron("(mock_mode: maybe)"),
            Err(ConfigError::Parse(_))
        ));
    }
}
