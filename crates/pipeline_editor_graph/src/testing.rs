// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scripted collaborators for pipeline and editor tests.

use crate::payload::{ImageData, ModelAsset, ModelFormat, VideoData};
use crate::services::{
    EnhanceRequest, ImageEnhancer, ImageToVideo, ImportError, ModelImporter, Renderer,
    SceneDescription, ServiceError, Services, TextToImage, VideoRequest,
};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Accepts any supported extension and keeps the bytes as-is
pub struct FakeImporter;

impl ModelImporter for FakeImporter {
    fn import(&self, file_name: &str, bytes: Vec<u8>) -> Result<ModelAsset, ImportError> {
        let ext = file_name.rsplit('.').next().unwrap_or_default();
        let format = ModelFormat::from_extension(ext)
            .ok_or_else(|| ImportError::UnsupportedFileType(ext.to_string()))?;
        Ok(ModelAsset {
            id: Uuid::nil(),
            name: file_name.to_string(),
            format,
            bytes: bytes.into(),
            vertex_count: None,
        })
    }
}

/// Deterministic renderer: same model and skybox give the same bytes
pub struct FakeRenderer;

impl Renderer for FakeRenderer {
    fn render(&self, scene: &SceneDescription) -> Result<ImageData, ServiceError> {
        let mut bytes = scene.model.bytes.to_vec();
        if let Some(skybox) = &scene.skybox {
            bytes.extend_from_slice(&skybox.bytes);
        }
        Ok(ImageData::png(bytes, scene.width, scene.height))
    }
}

/// Counts calls; can fail, panic or wait on a [`Notify`] before answering
#[derive(Default)]
pub struct FakeEnhancer {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub panic: bool,
    pub gate: Option<Arc<Notify>>,
}

impl FakeEnhancer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageEnhancer for FakeEnhancer {
    fn enhance(&self, request: EnhanceRequest) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail;
        let panic = self.panic;
        let gate = self.gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if panic {
                panic!("enhancer crashed");
            }
            if fail {
                return Err(ServiceError::Provider("HTTP 500".into()));
            }
            let mut bytes = request.image.bytes.to_vec();
            bytes.push(0xEE);
            Ok(ImageData::png(bytes, request.image.width, request.image.height))
        })
    }
}

/// Echoes the prompt back as image bytes
pub struct FakeTextToImage;

impl TextToImage for FakeTextToImage {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<ImageData, ServiceError>> {
        Box::pin(async move { Ok(ImageData::png(prompt.into_bytes(), 2, 1)) })
    }
}

/// Returns an in-memory video reference
pub struct FakeVideo;

impl ImageToVideo for FakeVideo {
    fn generate(&self, request: VideoRequest) -> BoxFuture<'static, Result<VideoData, ServiceError>> {
        Box::pin(async move {
            Ok(VideoData {
                uri: format!("memory://video/{}", request.image.bytes.len()),
                mime: "video/mp4".into(),
                duration_ms: 5000,
            })
        })
    }
}

pub fn services(enhancer: Arc<FakeEnhancer>) -> Services {
    Services {
        renderer: Arc::new(FakeRenderer),
        enhancer,
        text_to_image: Arc::new(FakeTextToImage),
        image_to_video: Arc::new(FakeVideo),
        importer: Arc::new(FakeImporter),
    }
}
