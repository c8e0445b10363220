// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema-tagged payloads published by nodes.
//!
//! Payloads are opaque handles (bytes, URIs, asset descriptors). The core
//! never looks inside an image or a model; it only routes, merges and
//! fingerprints them.

use crate::port::Schema;
use indexmap::IndexMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Encoded raster image (PNG, JPEG, ...)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageData {
    /// MIME type of the encoded bytes
    pub mime: String,
    /// Encoded image bytes
    pub bytes: Arc<[u8]>,
    /// Pixel width, when known
    pub width: u32,
    /// Pixel height, when known
    pub height: u32,
}

impl ImageData {
    /// Wrap encoded PNG bytes
    pub fn png(bytes: impl Into<Arc<[u8]>>, width: u32, height: u32) -> Self {
        Self {
            mime: "image/png".to_string(),
            bytes: bytes.into(),
            width,
            height,
        }
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("mime", &self.mime)
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// A generated video clip
#[derive(Debug, Clone, PartialEq, Hash, Eq)]
pub struct VideoData {
    /// Where the clip can be fetched or played from
    pub uri: String,
    /// MIME type of the clip
    pub mime: String,
    /// Clip length in milliseconds
    pub duration_ms: u64,
}

/// Supported 3D model file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    /// Binary glTF
    Glb,
    /// JSON glTF
    Gltf,
    /// Wavefront OBJ
    Obj,
    /// Stereolithography
    Stl,
}

impl ModelFormat {
    /// Resolve a format from a file extension (with or without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "glb" => Some(Self::Glb),
            "gltf" => Some(Self::Gltf),
            "obj" => Some(Self::Obj),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }
}

/// Opaque handle to an imported 3D model
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModelAsset {
    /// Asset ID assigned at import
    pub id: Uuid,
    /// Original file name
    pub name: String,
    /// Source format
    pub format: ModelFormat,
    /// Raw file bytes
    pub bytes: Arc<[u8]>,
    /// Vertex count, when the importer could determine it
    pub vertex_count: Option<usize>,
}

impl fmt::Debug for ModelAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAsset")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .field("vertex_count", &self.vertex_count)
            .finish()
    }
}

/// Value that travels along an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortValue {
    /// 3D model
    Model3D(ModelAsset),
    /// Skybox texture
    SkyboxTexture(ImageData),
    /// Rendered scene
    RenderedImage(ImageData),
    /// AI-enhanced image
    EnhancedImage(ImageData),
    /// Generated video
    GeneratedVideo(VideoData),
    /// Text
    Text(String),
}

impl PortValue {
    /// Get the schema for this value
    pub fn schema(&self) -> Schema {
        match self {
            Self::Model3D(_) => Schema::Model3D,
            Self::SkyboxTexture(_) => Schema::SkyboxTexture,
            Self::RenderedImage(_) => Schema::RenderedImage,
            Self::EnhancedImage(_) => Schema::EnhancedImage,
            Self::GeneratedVideo(_) => Schema::GeneratedVideo,
            Self::Text(_) => Schema::Text,
        }
    }

    /// Content fingerprint used to recognise a payload that was already processed
    pub fn key(&self) -> PayloadKey {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        PayloadKey(hasher.finish())
    }

    /// The image carried by this value, if it is any kind of image
    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            Self::SkyboxTexture(image) | Self::RenderedImage(image) | Self::EnhancedImage(image) => {
                Some(image)
            }
            _ => None,
        }
    }

    /// The model carried by this value
    pub fn as_model(&self) -> Option<&ModelAsset> {
        match self {
            Self::Model3D(model) => Some(model),
            _ => None,
        }
    }

    /// The video carried by this value
    pub fn as_video(&self) -> Option<&VideoData> {
        match self {
            Self::GeneratedVideo(video) => Some(video),
            _ => None,
        }
    }

    /// The text carried by this value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Fingerprint of a payload's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadKey(pub u64);

/// A node's published output, keyed by schema.
///
/// Used both as the partial payload handed to a publish and as the merged
/// entry kept by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeData {
    values: IndexMap<Schema, PortValue>,
}

impl NodeData {
    /// Create an empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a payload holding a single value
    pub fn single(value: PortValue) -> Self {
        let mut data = Self::new();
        data.set(value);
        data
    }

    /// Set a value, replacing any previous value of the same schema
    pub fn set(&mut self, value: PortValue) {
        self.values.insert(value.schema(), value);
    }

    /// Builder form of [`NodeData::set`]
    pub fn with(mut self, value: PortValue) -> Self {
        self.set(value);
        self
    }

    /// Get the value for a schema
    pub fn get(&self, schema: Schema) -> Option<&PortValue> {
        self.values.get(&schema)
    }

    /// Merge another payload into this one; fields in `other` win
    pub fn merge(&mut self, other: NodeData) {
        for (schema, value) in other.values {
            self.values.insert(schema, value);
        }
    }

    /// Iterate over the values
    pub fn values(&self) -> impl Iterator<Item = &PortValue> {
        self.values.values()
    }

    /// Number of values held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value is held
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(byte: u8) -> ImageData {
        ImageData::png(vec![byte; 16], 4, 4)
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let mut entry = NodeData::single(PortValue::Text("sunset".into()));
        entry.merge(NodeData::single(PortValue::RenderedImage(image(1))));
        entry.merge(NodeData::single(PortValue::RenderedImage(image(2))));

        assert_eq!(entry.len(), 2);
        assert_eq!(entry.get(Schema::Text).and_then(PortValue::as_text), Some("sunset"));
        assert_eq!(
            entry.get(Schema::RenderedImage).and_then(PortValue::as_image),
            Some(&image(2))
        );
    }

    #[test]
    fn test_key_tracks_content_not_identity() {
        let a = PortValue::RenderedImage(image(7));
        let b = PortValue::RenderedImage(image(7));
        let c = PortValue::RenderedImage(image(8));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        // Same bytes under a different schema is a different payload
        assert_ne!(a.key(), PortValue::EnhancedImage(image(7)).key());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ModelFormat::from_extension(".GLB"), Some(ModelFormat::Glb));
        assert_eq!(ModelFormat::from_extension("stl"), Some(ModelFormat::Stl));
        assert_eq!(ModelFormat::from_extension("fbx"), None);
    }
}
