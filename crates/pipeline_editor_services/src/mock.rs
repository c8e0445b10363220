// SPDX-License-Identifier: MIT OR Apache-2.0
//! Local placeholder AI services for development and tests.
//!
//! Each call waits the configured latency, then answers with media derived
//! from its input, so the pipeline behaves like it would against a provider
//! without any network access.

use futures::future::BoxFuture;
use image::{imageops, ImageFormat, Rgba, RgbaImage};
use pipeline_editor_graph::payload::{ImageData, VideoData};
use pipeline_editor_graph::services::{
    EnhanceRequest, ImageEnhancer, ImageToVideo, ServiceError, TextToImage, VideoRequest,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::time::Duration;

const SKYBOX_SIZE: (u32, u32) = (512, 256);
const MOCK_VIDEO_MS: u64 = 5000;

fn encode_png(image: &RgbaImage) -> Result<ImageData, ServiceError> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|err| ServiceError::Provider(format!("failed to encode image: {err}")))?;
    Ok(ImageData::png(bytes.into_inner(), image.width(), image.height()))
}

fn fingerprint(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

async fn simulate(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Brightens and sharpens contrast of the input image
#[derive(Debug, Clone, Default)]
pub struct MockImageEnhancer {
    latency: Duration,
}

impl MockImageEnhancer {
    /// Enhancer answering after `latency`
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl ImageEnhancer for MockImageEnhancer {
    fn enhance(&self, request: EnhanceRequest) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
        let latency = self.latency;
        Box::pin(async move {
            tracing::debug!(prompt = ?request.prompt, "Mock enhancement requested");
            simulate(latency).await;

            let source = image::load_from_memory(&request.image.bytes)
                .map_err(|err| ServiceError::Provider(format!("could not decode image: {err}")))?
                .to_rgba8();
            let contrasted = imageops::contrast(&source, 15.0);
            let enhanced = imageops::brighten(&contrasted, 20);
            encode_png(&enhanced)
        })
    }
}

/// Paints a two-tone sky whose colors follow from the prompt
#[derive(Debug, Clone, Default)]
pub struct MockTextToImage {
    latency: Duration,
}

impl MockTextToImage {
    /// Generator answering after `latency`
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl TextToImage for MockTextToImage {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
        let latency = self.latency;
        Box::pin(async move {
            tracing::debug!(%prompt, "Mock skybox requested");
            simulate(latency).await;

            let [r, g, b, r2, g2, b2, ..] = fingerprint(&prompt).to_le_bytes();
            let (width, height) = SKYBOX_SIZE;
            let sky = RgbaImage::from_fn(width, height, |_, y| {
                let t = y as f32 / height as f32;
                let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
                Rgba([mix(r, r2), mix(g, g2), mix(b, b2), 255])
            });
            encode_png(&sky)
        })
    }
}

/// Returns a stable mock video reference for each input image
#[derive(Debug, Clone, Default)]
pub struct MockImageToVideo {
    latency: Duration,
}

impl MockImageToVideo {
    /// Generator answering after `latency`
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl ImageToVideo for MockImageToVideo {
    fn generate(&self, request: VideoRequest) -> BoxFuture<'static, Result<VideoData, ServiceError>> {
        let latency = self.latency;
        Box::pin(async move {
            simulate(latency).await;
            let id = fingerprint((&request.image.bytes[..], &request.prompt));
            tracing::debug!("Mock video generated: {id:016x}");
            Ok(VideoData {
                uri: format!("mock://video/{id:016x}.mp4"),
                mime: "video/mp4".into(),
                duration_ms: MOCK_VIDEO_MS,
            })
        })
    }
}
