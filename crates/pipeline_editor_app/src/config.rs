// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runner configuration.

use pipeline_editor_services::{ConfigError, ServiceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration of a pipeline run, stored as RON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Service selection and tuning
    pub services: ServiceConfig,
    /// Settings file with API keys and flags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
    /// Where to save the graph after the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_output: Option<PathBuf>,
    /// Model to load; a built-in cube when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// Prompt for the skybox generator
    pub skybox_prompt: String,
    /// Prompt for the video generator
    pub video_prompt: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            services: ServiceConfig::default(),
            settings_path: None,
            graph_output: None,
            model_path: None,
            skybox_prompt: "warm desert sunset, volumetric clouds".into(),
            video_prompt: "slow orbit around the object".into(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a RON document
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.services.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(AppConfig::from_ron("()").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_nested_service_config() {
        let config = AppConfig::from_ron(
            r#"(
                services: (mock_mode: true, simulated_latency_ms: 0),
                graph_output: Some("out/graph.ron"),
                video_prompt: "dolly zoom",
            )"#,
        )
        .unwrap();
        assert_eq!(config.services.simulated_latency_ms, 0);
        assert_eq!(config.graph_output, Some(PathBuf::from("out/graph.ron")));
        assert_eq!(config.video_prompt, "dolly zoom");
    }

    #[test]
    fn test_invalid_service_values_rejected() {
        assert!(AppConfig::from_ron("(services: (max_model_bytes: 0))").is_err());
    }
}
