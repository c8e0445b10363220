// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builds the collaborator set for a pipeline.

use crate::config::ServiceConfig;
use crate::importer::FileModelImporter;
use crate::mock::{MockImageEnhancer, MockImageToVideo, MockTextToImage};
use crate::remote::{ProviderTransport, RemoteServices};
use crate::renderer::PlaceholderRenderer;
use crate::settings::SettingsStore;
use pipeline_editor_graph::services::Services;
use std::sync::Arc;

/// Chooses mock or provider implementations from explicit configuration
pub struct ServiceFactory {
    config: ServiceConfig,
    settings: Arc<SettingsStore>,
    transport: Option<Arc<dyn ProviderTransport>>,
}

impl ServiceFactory {
    /// Factory over a config and a settings store
    pub fn new(config: ServiceConfig, settings: Arc<SettingsStore>) -> Self {
        Self {
            config,
            settings,
            transport: None,
        }
    }

    /// Use `transport` for provider-backed services
    pub fn with_transport(mut self, transport: Arc<dyn ProviderTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Whether mock services will be built. A flag persisted in the
    /// settings store overrides the config file.
    pub fn mock_mode(&self) -> bool {
        self.settings.mock_mode().unwrap_or(self.config.mock_mode)
    }

    /// Build the services
    pub fn build(&self) -> Services {
        let renderer = Arc::new(PlaceholderRenderer);
        let importer = Arc::new(FileModelImporter::new(self.config.max_model_bytes));

        if self.mock_mode() {
            let latency = self.config.simulated_latency();
            tracing::info!(latency_ms = self.config.simulated_latency_ms, "Using mock AI services");
            return Services {
                renderer,
                enhancer: Arc::new(MockImageEnhancer::new(latency)),
                text_to_image: Arc::new(MockTextToImage::new(latency)),
                image_to_video: Arc::new(MockImageToVideo::new(latency)),
                importer,
            };
        }

        if self.transport.is_none() {
            tracing::warn!("Provider mode without a transport; generation calls will fail");
        }
        let remote = Arc::new(RemoteServices::new(
            self.transport.clone(),
            Arc::clone(&self.settings),
            self.config.video_poll_interval(),
            self.config.video_max_poll_attempts,
        ));
        Services {
            renderer,
            enhancer: remote.clone(),
            text_to_image: remote.clone(),
            image_to_video: remote,
            importer,
        }
    }
}
