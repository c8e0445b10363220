// SPDX-License-Identifier: MIT OR Apache-2.0
//! Provider-backed AI services.
//!
//! Calls go through a [`ProviderTransport`], which owns the wire format of
//! a concrete provider. The services here handle what is common to all of
//! them: credential lookup before any transport call, submit-then-poll for
//! long-running jobs, and mapping failures onto [`ServiceError`].

use crate::settings::SettingsStore;
use futures::future::BoxFuture;
use pipeline_editor_graph::payload::{ImageData, VideoData};
use pipeline_editor_graph::services::{
    EnhanceRequest, ImageEnhancer, ImageToVideo, ServiceError, TextToImage, VideoRequest,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Generative provider a job is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Image-to-image enhancement
    Enhancement,
    /// Text-to-image skybox generation
    Skybox,
    /// Image-to-video generation
    Video,
}

impl Provider {
    /// Settings key holding the provider's API key
    pub fn api_key_setting(self) -> &'static str {
        match self {
            Self::Enhancement => "enhancement_api_key",
            Self::Skybox => "skybox_api_key",
            Self::Video => "video_api_key",
        }
    }

    /// Display name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Enhancement => "image enhancement",
            Self::Skybox => "skybox generation",
            Self::Video => "video generation",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Job submitted to a provider
#[derive(Debug, Clone)]
pub struct ProviderJob {
    /// Target provider
    pub provider: Provider,
    /// Credential for the provider
    pub api_key: String,
    /// Prompt, if any
    pub prompt: Option<String>,
    /// Input image, if any
    pub image: Option<ImageData>,
}

/// Provider-side job reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Provider that owns the job
    pub provider: Provider,
    /// Provider's job ID
    pub id: String,
}

/// Progress of a submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still running
    Pending,
    /// Finished; the result can be fetched
    Succeeded {
        /// Where the result can be played or downloaded
        uri: String,
    },
    /// Provider gave up
    Failed(String),
}

/// Wire-level access to generative providers
pub trait ProviderTransport: Send + Sync {
    /// Submit a job
    fn submit(&self, job: ProviderJob) -> BoxFuture<'static, Result<JobHandle, ServiceError>>;
    /// Check a job's progress
    fn poll(&self, handle: JobHandle) -> BoxFuture<'static, Result<JobStatus, ServiceError>>;
    /// Download a finished image result
    fn fetch(&self, handle: JobHandle) -> BoxFuture<'static, Result<ImageData, ServiceError>>;
}

/// Provider-backed enhancement, skybox and video services
#[derive(Clone)]
pub struct RemoteServices {
    transport: Option<Arc<dyn ProviderTransport>>,
    settings: Arc<SettingsStore>,
    poll_interval: Duration,
    max_polls: u32,
}

impl RemoteServices {
    /// Services reading credentials from `settings`
    pub fn new(
        transport: Option<Arc<dyn ProviderTransport>>,
        settings: Arc<SettingsStore>,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            transport,
            settings,
            poll_interval,
            max_polls,
        }
    }

    /// Resolve credential and transport for a job; no transport call is
    /// made when either is missing
    fn prepare(
        &self,
        provider: Provider,
        prompt: Option<String>,
        image: Option<ImageData>,
    ) -> Result<(Arc<dyn ProviderTransport>, ProviderJob), ServiceError> {
        let api_key = self
            .settings
            .api_key(provider.api_key_setting())
            .ok_or_else(|| ServiceError::CredentialMissing(provider.to_string()))?;
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| ServiceError::Provider("no provider transport configured".into()))?;
        Ok((
            transport,
            ProviderJob {
                provider,
                api_key,
                prompt,
                image,
            },
        ))
    }

    fn image_job(
        &self,
        provider: Provider,
        prompt: Option<String>,
        image: Option<ImageData>,
    ) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
        let prepared = self.prepare(provider, prompt, image);
        Box::pin(async move {
            let (transport, job) = prepared?;
            tracing::info!(%provider, "Submitting image job");
            let handle = transport.submit(job).await?;
            transport.fetch(handle).await
        })
    }
}

impl ImageEnhancer for RemoteServices {
    fn enhance(&self, request: EnhanceRequest) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
        self.image_job(Provider::Enhancement, request.prompt, Some(request.image))
    }
}

impl TextToImage for RemoteServices {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
        self.image_job(Provider::Skybox, Some(prompt), None)
    }
}

impl ImageToVideo for RemoteServices {
    fn generate(&self, request: VideoRequest) -> BoxFuture<'static, Result<VideoData, ServiceError>> {
        let prepared = self.prepare(Provider::Video, request.prompt, Some(request.image));
        let interval = self.poll_interval;
        let max_polls = self.max_polls;

        Box::pin(async move {
            let (transport, job) = prepared?;
            let handle = transport.submit(job).await?;
            tracing::info!(job = %handle.id, "Video job submitted");

            for attempt in 1..=max_polls {
                tokio::time::sleep(interval).await;
                match transport.poll(handle.clone()).await? {
                    JobStatus::Pending => {
                        tracing::debug!(job = %handle.id, attempt, "Video job pending");
                    }
                    JobStatus::Succeeded { uri } => {
                        tracing::info!(job = %handle.id, attempt, "Video job finished");
                        return Ok(VideoData {
                            uri,
                            mime: "video/mp4".into(),
                            duration_ms: 0,
                        });
                    }
                    JobStatus::Failed(reason) => return Err(ServiceError::Provider(reason)),
                }
            }

            tracing::warn!(job = %handle.id, max_polls, "Video job timed out");
            Err(ServiceError::GenerationTimeout { attempts: max_polls })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Transport that replays scripted poll results and records calls
    #[derive(Default)]
    struct ScriptedTransport {
        statuses: Mutex<VecDeque<JobStatus>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedTransport {
        fn with_statuses(statuses: impl IntoIterator<Item = JobStatus>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into_iter().collect()),
                calls: Mutex::default(),
            })
        }

        fn idle() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    impl ProviderTransport for ScriptedTransport {
        fn submit(&self, job: ProviderJob) -> BoxFuture<'static, Result<JobHandle, ServiceError>> {
            self.calls.lock().push("submit");
            Box::pin(async move {
                Ok(JobHandle {
                    provider: job.provider,
                    id: "job-1".into(),
                })
            })
        }

        fn poll(&self, _handle: JobHandle) -> BoxFuture<'static, Result<JobStatus, ServiceError>> {
            self.calls.lock().push("poll");
            let status = self.statuses.lock().pop_front().unwrap_or(JobStatus::Pending);
            Box::pin(async move { Ok(status) })
        }

        fn fetch(&self, _handle: JobHandle) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
            self.calls.lock().push("fetch");
            Box::pin(async move { Ok(ImageData::png(vec![1, 2, 3], 1, 1)) })
        }
    }

    fn settings_with(keys: &[&str]) -> Arc<SettingsStore> {
        let settings = SettingsStore::in_memory();
        for key in keys {
            settings.set(*key, "secret").unwrap();
        }
        Arc::new(settings)
    }

    fn remote(transport: &Arc<ScriptedTransport>, settings: Arc<SettingsStore>, max_polls: u32) -> RemoteServices {
        let transport: Arc<dyn ProviderTransport> = transport.clone();
        RemoteServices::new(Some(transport), settings, Duration::from_millis(1), max_polls)
    }

    fn video_request() -> VideoRequest {
        VideoRequest {
            image: ImageData::png(vec![9], 1, 1),
            prompt: None,
        }
    }

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let transport = ScriptedTransport::idle();
        let services = remote(&transport, settings_with(&[]), 3);

        let err = ImageToVideo::generate(&services, video_request()).await.unwrap_err();
        assert_eq!(err, ServiceError::CredentialMissing("video generation".into()));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_transport_is_provider_error() {
        let services = RemoteServices::new(None, settings_with(&["skybox_api_key"]), Duration::ZERO, 1);
        let err = TextToImage::generate(&services, "sunset".into()).await.unwrap_err();
        assert_eq!(err, ServiceError::Provider("no provider transport configured".into()));
    }

    #[tokio::test]
    async fn test_video_polls_until_done() {
        let transport = ScriptedTransport::with_statuses([
            JobStatus::Pending,
            JobStatus::Pending,
            JobStatus::Succeeded {
                uri: "https://cdn.example/v.mp4".into(),
            },
        ]);
        let services = remote(&transport, settings_with(&["video_api_key"]), 10);

        let video = ImageToVideo::generate(&services, video_request()).await.unwrap();
        assert_eq!(video.uri, "https://cdn.example/v.mp4");
        assert_eq!(transport.calls(), ["submit", "poll", "poll", "poll"]);
    }

    #[tokio::test]
    async fn test_video_times_out_after_max_polls() {
        let transport = ScriptedTransport::idle();
        let services = remote(&transport, settings_with(&["video_api_key"]), 4);

        let err = ImageToVideo::generate(&services, video_request()).await.unwrap_err();
        assert_eq!(err, ServiceError::GenerationTimeout { attempts: 4 });
        assert_eq!(transport.calls().iter().filter(|c| **c == "poll").count(), 4);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_reason() {
        let transport = ScriptedTransport::with_statuses([JobStatus::Failed("content policy".into())]);
        let services = remote(&transport, settings_with(&["video_api_key"]), 4);

        let err = ImageToVideo::generate(&services, video_request()).await.unwrap_err();
        assert_eq!(err, ServiceError::Provider("content policy".into()));
    }

    #[tokio::test]
    async fn test_enhance_submits_then_fetches() {
        let transport = ScriptedTransport::idle();
        let services = remote(&transport, settings_with(&["enhancement_api_key"]), 1);

        let image = services
            .enhance(EnhanceRequest {
                image: ImageData::png(vec![0], 1, 1),
                prompt: Some("crisper".into()),
            })
            .await
            .unwrap();
        assert_eq!(&image.bytes[..], &[1, 2, 3]);
        assert_eq!(transport.calls(), ["submit", "fetch"]);
    }
}
