// SPDX-License-Identifier: MIT OR Apache-2.0
//! Contracts for the external collaborators the pipeline calls into.
//!
//! Rendering is synchronous. Generative calls are asynchronous and return
//! boxed futures so implementations can sit behind `Arc<dyn ...>` and be
//! swapped between provider-backed and local placeholder versions.

use crate::payload::{ImageData, ModelAsset, VideoData};
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Largest model file accepted for import
pub const MAX_MODEL_BYTES: usize = 50 * 1024 * 1024;

/// Model import failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// Extension is not one of .glb, .gltf, .obj, .stl
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// File exceeds the size ceiling
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge {
        /// File size in bytes
        size: usize,
        /// Ceiling in bytes
        limit: usize,
    },

    /// File content could not be parsed
    #[error("Failed to parse model: {0}")]
    ParseFailure(String),

    /// File could not be opened or read
    #[error("Failed to read model file: {0}")]
    Unreadable(String),
}

/// Failure of a rendering or generative call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No API key configured for the provider
    #[error("No API key configured for {0}")]
    CredentialMissing(String),

    /// Provider returned an error, a non-success status, or was unreachable
    #[error("Provider error: {0}")]
    Provider(String),

    /// Submit-then-poll generation did not finish in time
    #[error("Generation timed out after {attempts} polls")]
    GenerationTimeout {
        /// Polls performed before giving up
        attempts: u32,
    },

    /// Required input is missing
    #[error("Missing input: {0}")]
    MissingInput(String),
}

impl ServiceError {
    /// Short title for a user-facing notification
    pub fn title(&self) -> &'static str {
        match self {
            Self::CredentialMissing(_) => "API key required",
            Self::Provider(_) => "Generation failed",
            Self::GenerationTimeout { .. } => "Generation timed out",
            Self::MissingInput(_) => "Missing input",
        }
    }
}

/// Scene handed to the renderer
#[derive(Debug, Clone)]
pub struct SceneDescription {
    /// Model to render
    pub model: ModelAsset,
    /// Environment texture, if any
    pub skybox: Option<ImageData>,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
}

/// Produces a raster of a scene
pub trait Renderer: Send + Sync {
    /// Render the scene
    fn render(&self, scene: &SceneDescription) -> Result<ImageData, ServiceError>;
}

/// Image enhancement request
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    /// Image to enhance
    pub image: ImageData,
    /// Optional guidance prompt
    pub prompt: Option<String>,
}

/// Image-to-image enhancement
pub trait ImageEnhancer: Send + Sync {
    /// Enhance an image
    fn enhance(&self, request: EnhanceRequest) -> BoxFuture<'static, Result<ImageData, ServiceError>>;
}

/// Text-to-image generation (used for skyboxes)
pub trait TextToImage: Send + Sync {
    /// Generate an image from a prompt
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<ImageData, ServiceError>>;
}

/// Image-to-video request
#[derive(Debug, Clone)]
pub struct VideoRequest {
    /// First frame / reference image
    pub image: ImageData,
    /// Optional motion prompt
    pub prompt: Option<String>,
}

/// Image-to-video generation
pub trait ImageToVideo: Send + Sync {
    /// Generate a video from an image
    fn generate(&self, request: VideoRequest) -> BoxFuture<'static, Result<VideoData, ServiceError>>;
}

/// Turns model file bytes into a renderable asset
pub trait ModelImporter: Send + Sync {
    /// Import a model file
    fn import(&self, file_name: &str, bytes: Vec<u8>) -> Result<ModelAsset, ImportError>;

    /// Read and import a model file from disk
    fn import_path(&self, path: &Path) -> Result<ModelAsset, ImportError> {
        let bytes = std::fs::read(path)
            .map_err(|err| ImportError::Unreadable(format!("{}: {err}", path.display())))?;
        self.import(&file_name_of(path), bytes)
    }
}

/// File name component of `path`, or an empty string
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The full set of collaborators a pipeline needs
#[derive(Clone)]
pub struct Services {
    /// Scene renderer
    pub renderer: Arc<dyn Renderer>,
    /// Image enhancer
    pub enhancer: Arc<dyn ImageEnhancer>,
    /// Text-to-image generator
    pub text_to_image: Arc<dyn TextToImage>,
    /// Image-to-video generator
    pub image_to_video: Arc<dyn ImageToVideo>,
    /// Model importer
    pub importer: Arc<dyn ModelImporter>,
}
