// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions and the schema tags that flow through them.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Identifier of a port, unique within its node (e.g. `model-output`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(Cow<'static, str>);

impl PortId {
    /// Create a port ID from a static string
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Create a port ID from an owned string
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

impl PortDirection {
    /// The direction a port must have to connect to this one
    pub fn complement(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// Semantic data type carried by a port and by published payloads.
///
/// The set is closed: there is no `Any` and no implicit conversion between
/// schemas. Changing schema always takes a transform node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Schema {
    /// An imported 3D model
    Model3D,
    /// Equirectangular skybox texture
    SkyboxTexture,
    /// Raster produced by the scene renderer
    RenderedImage,
    /// Raster produced by an AI enhancement pass
    EnhancedImage,
    /// Video produced by image-to-video generation
    GeneratedVideo,
    /// Free text (prompts)
    Text,
}

impl Schema {
    /// All schemas, in declaration order
    pub const ALL: [Schema; 6] = [
        Self::Model3D,
        Self::SkyboxTexture,
        Self::RenderedImage,
        Self::EnhancedImage,
        Self::GeneratedVideo,
        Self::Text,
    ];

    /// Get the color for this schema (for UI)
    pub fn color(self) -> [u8; 3] {
        match self {
            Self::Model3D => [200, 150, 80],
            Self::SkyboxTexture => [100, 150, 200],
            Self::RenderedImage => [80, 200, 120],
            Self::EnhancedImage => [200, 100, 200],
            Self::GeneratedVideo => [220, 80, 80],
            Self::Text => [200, 180, 150],
        }
    }

    /// Check if a value of this schema may flow into a port of `other`.
    ///
    /// Only an exact match is accepted.
    pub fn can_connect_to(self, other: Schema) -> bool {
        self == other
    }

    /// Upper-case tag used in logs and saved graphs
    pub fn tag(self) -> &'static str {
        match self {
            Self::Model3D => "MODEL_3D",
            Self::SkyboxTexture => "SKYBOX_TEXTURE",
            Self::RenderedImage => "RENDERED_IMAGE",
            Self::EnhancedImage => "ENHANCED_IMAGE",
            Self::GeneratedVideo => "GENERATED_VIDEO",
            Self::Text => "TEXT",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A port on a node type.
///
/// Ports are declared statically per node kind and never change after the
/// node is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Port ID, unique within the node
    pub id: PortId,
    /// Human-readable label
    pub label: &'static str,
    /// Port direction
    pub direction: PortDirection,
    /// Schema carried by the port
    pub schema: Schema,
}

impl Port {
    /// Declare an input port
    pub const fn input(id: &'static str, label: &'static str, schema: Schema) -> Self {
        Self {
            id: PortId::from_static(id),
            label,
            direction: PortDirection::Input,
            schema,
        }
    }

    /// Declare an output port
    pub const fn output(id: &'static str, label: &'static str, schema: Schema) -> Self {
        Self {
            id: PortId::from_static(id),
            label,
            direction: PortDirection::Output,
            schema,
        }
    }

    /// Check if a connection to another port is valid
    pub fn can_connect(&self, other: &Port) -> bool {
        // Must be opposite directions
        if self.direction == other.direction {
            return false;
        }

        self.schema.can_connect_to(other.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_schema_match_required() {
        let out = Port::output("rendered-image-output", "Image", Schema::RenderedImage);
        let rendered_in = Port::input("rendered-image-input", "Image", Schema::RenderedImage);
        let enhanced_in = Port::input("enhanced-image-input", "Image", Schema::EnhancedImage);

        assert!(out.can_connect(&rendered_in));
        assert!(rendered_in.can_connect(&out));
        assert!(!out.can_connect(&enhanced_in));
    }

    #[test]
    fn test_same_direction_rejected() {
        let a = Port::input("a", "A", Schema::Text);
        let b = Port::input("b", "B", Schema::Text);
        assert!(!a.can_connect(&b));

        let c = Port::output("c", "C", Schema::Text);
        let d = Port::output("d", "D", Schema::Text);
        assert!(!c.can_connect(&d));
    }

    #[test]
    fn test_port_id_roundtrip_through_ron() {
        let id = PortId::from_static("model-output");
        let text = ron::to_string(&id).unwrap();
        let back: PortId = ron::from_str(&text).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.as_str(), "model-output");
    }
}
