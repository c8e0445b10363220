// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the pipeline graph.

use crate::port::{Port, PortDirection, PortId, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node.
///
/// Assigned from the graph's monotonic counter, so the first node of a
/// fresh graph is always `"1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known port IDs
pub mod ports {
    use crate::port::PortId;

    /// Model output of the model loader
    pub const MODEL_OUTPUT: PortId = PortId::from_static("model-output");
    /// Model input of the scene renderer
    pub const MODEL_INPUT: PortId = PortId::from_static("model-input");
    /// Skybox output of the skybox generator
    pub const SKYBOX_OUTPUT: PortId = PortId::from_static("skybox-output");
    /// Skybox input of the scene renderer
    pub const SKYBOX_INPUT: PortId = PortId::from_static("skybox-input");
    /// Rendered image output of the scene renderer
    pub const RENDERED_IMAGE_OUTPUT: PortId = PortId::from_static("rendered-image-output");
    /// Rendered image input of the enhancer nodes
    pub const RENDERED_IMAGE_INPUT: PortId = PortId::from_static("rendered-image-input");
    /// Enhanced image output of the enhancer nodes
    pub const ENHANCED_IMAGE_OUTPUT: PortId = PortId::from_static("enhanced-image-output");
    /// Enhanced image input of the video generator
    pub const ENHANCED_IMAGE_INPUT: PortId = PortId::from_static("enhanced-image-input");
    /// Video output of the video generator
    pub const VIDEO_OUTPUT: PortId = PortId::from_static("video-output");
    /// Video input of the video player
    pub const VIDEO_INPUT: PortId = PortId::from_static("video-input");
    /// Text output of the text prompt
    pub const TEXT_OUTPUT: PortId = PortId::from_static("text-output");
    /// Prompt input shared by the generator nodes
    pub const PROMPT_INPUT: PortId = PortId::from_static("prompt-input");
}

static NO_PORTS: [Port; 0] = [];

static MODEL_LOADER_OUTPUTS: [Port; 1] = [Port::output("model-output", "3D Model", Schema::Model3D)];

static TEXT_PROMPT_OUTPUTS: [Port; 1] = [Port::output("text-output", "Text", Schema::Text)];

static SKYBOX_GENERATOR_INPUTS: [Port; 1] = [Port::input("prompt-input", "Prompt", Schema::Text)];
static SKYBOX_GENERATOR_OUTPUTS: [Port; 1] =
    [Port::output("skybox-output", "Skybox", Schema::SkyboxTexture)];

static SCENE_RENDERER_INPUTS: [Port; 2] = [
    Port::input("model-input", "3D Model", Schema::Model3D),
    Port::input("skybox-input", "Skybox", Schema::SkyboxTexture),
];
static SCENE_RENDERER_OUTPUTS: [Port; 1] =
    [Port::output("rendered-image-output", "Rendered Image", Schema::RenderedImage)];

static IMAGE_ENHANCER_INPUTS: [Port; 2] = [
    Port::input("rendered-image-input", "Rendered Image", Schema::RenderedImage),
    Port::input("prompt-input", "Prompt", Schema::Text),
];
static ENHANCED_IMAGE_INPUTS: [Port; 1] =
    [Port::input("rendered-image-input", "Rendered Image", Schema::RenderedImage)];
static ENHANCER_OUTPUTS: [Port; 1] =
    [Port::output("enhanced-image-output", "Enhanced Image", Schema::EnhancedImage)];

static VIDEO_GENERATOR_INPUTS: [Port; 2] = [
    Port::input("enhanced-image-input", "Enhanced Image", Schema::EnhancedImage),
    Port::input("prompt-input", "Prompt", Schema::Text),
];
static VIDEO_GENERATOR_OUTPUTS: [Port; 1] =
    [Port::output("video-output", "Video", Schema::GeneratedVideo)];

static VIDEO_PLAYER_INPUTS: [Port; 1] = [Port::input("video-input", "Video", Schema::GeneratedVideo)];

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Nodes that bring data into the pipeline
    Input,
    /// 3D scene nodes
    Scene,
    /// Generative AI nodes
    Ai,
    /// Sinks (preview, playback)
    Output,
}

/// The closed set of node kinds. A kind fixes the node's behavior and ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Imports a 3D model file
    ModelLoader,
    /// Free-text prompt source
    TextPrompt,
    /// Generates a skybox texture from a prompt
    SkyboxGenerator,
    /// Renders the model inside the skybox
    SceneRenderer,
    /// Enhances a rendered image on demand
    AiImageEnhancer,
    /// Enhances every new rendered image automatically
    AiEnhancedImage,
    /// Turns an enhanced image into a video
    VideoGenerator,
    /// Plays a generated video
    VideoPlayer,
}

impl NodeKind {
    /// All kinds, in menu order
    pub const ALL: [NodeKind; 8] = [
        Self::ModelLoader,
        Self::TextPrompt,
        Self::SkyboxGenerator,
        Self::SceneRenderer,
        Self::AiImageEnhancer,
        Self::AiEnhancedImage,
        Self::VideoGenerator,
        Self::VideoPlayer,
    ];

    /// Input ports, in declaration order
    pub fn inputs(self) -> &'static [Port] {
        match self {
            Self::ModelLoader | Self::TextPrompt => &NO_PORTS,
            Self::SkyboxGenerator => &SKYBOX_GENERATOR_INPUTS,
            Self::SceneRenderer => &SCENE_RENDERER_INPUTS,
            Self::AiImageEnhancer => &IMAGE_ENHANCER_INPUTS,
            Self::AiEnhancedImage => &ENHANCED_IMAGE_INPUTS,
            Self::VideoGenerator => &VIDEO_GENERATOR_INPUTS,
            Self::VideoPlayer => &VIDEO_PLAYER_INPUTS,
        }
    }

    /// Output ports, in declaration order
    pub fn outputs(self) -> &'static [Port] {
        match self {
            Self::ModelLoader => &MODEL_LOADER_OUTPUTS,
            Self::TextPrompt => &TEXT_PROMPT_OUTPUTS,
            Self::SkyboxGenerator => &SKYBOX_GENERATOR_OUTPUTS,
            Self::SceneRenderer => &SCENE_RENDERER_OUTPUTS,
            Self::AiImageEnhancer | Self::AiEnhancedImage => &ENHANCER_OUTPUTS,
            Self::VideoGenerator => &VIDEO_GENERATOR_OUTPUTS,
            Self::VideoPlayer => &NO_PORTS,
        }
    }

    /// Display name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::ModelLoader => "3D Model Loader",
            Self::TextPrompt => "Text Prompt",
            Self::SkyboxGenerator => "Skybox Generator",
            Self::SceneRenderer => "Scene Renderer",
            Self::AiImageEnhancer => "AI Image Enhancer",
            Self::AiEnhancedImage => "AI Enhanced Image",
            Self::VideoGenerator => "Video Generator",
            Self::VideoPlayer => "Video Player",
        }
    }

    /// Category
    pub fn category(self) -> NodeCategory {
        match self {
            Self::ModelLoader | Self::TextPrompt => NodeCategory::Input,
            Self::SceneRenderer => NodeCategory::Scene,
            Self::SkyboxGenerator
            | Self::AiImageEnhancer
            | Self::AiEnhancedImage
            | Self::VideoGenerator => NodeCategory::Ai,
            Self::VideoPlayer => NodeCategory::Output,
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::ModelLoader => "Load a .glb, .gltf, .obj or .stl model",
            Self::TextPrompt => "Free text used as a prompt by generator nodes",
            Self::SkyboxGenerator => "Generate an environment texture from a prompt",
            Self::SceneRenderer => "Render the model inside the skybox",
            Self::AiImageEnhancer => "Enhance a rendered image on demand",
            Self::AiEnhancedImage => "Automatically enhance each new rendered image",
            Self::VideoGenerator => "Animate an enhanced image into a short clip",
            Self::VideoPlayer => "Play back a generated video",
        }
    }

    /// Stable type identifier
    pub fn type_id(self) -> &'static str {
        match self {
            Self::ModelLoader => "model_loader",
            Self::TextPrompt => "text_prompt",
            Self::SkyboxGenerator => "skybox_generator",
            Self::SceneRenderer => "scene_renderer",
            Self::AiImageEnhancer => "ai_image_enhancer",
            Self::AiEnhancedImage => "ai_enhanced_image",
            Self::VideoGenerator => "video_generator",
            Self::VideoPlayer => "video_player",
        }
    }

    /// Find a port by ID on either side
    pub fn port(self, port_id: &PortId) -> Option<&'static Port> {
        self.inputs()
            .iter()
            .find(|p| p.id == *port_id)
            .or_else(|| self.outputs().iter().find(|p| p.id == *port_id))
    }

    /// First port with the given schema and direction
    pub fn port_with(self, schema: Schema, direction: PortDirection) -> Option<&'static Port> {
        let ports = match direction {
            PortDirection::Input => self.inputs(),
            PortDirection::Output => self.outputs(),
        };
        ports.iter().find(|p| p.schema == schema)
    }

    /// Configuration a fresh node of this kind starts with
    pub fn default_config(self) -> NodeConfig {
        match self {
            Self::TextPrompt
            | Self::SkyboxGenerator
            | Self::AiImageEnhancer
            | Self::VideoGenerator => NodeConfig::Prompt(String::new()),
            _ => NodeConfig::Empty,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Type-specific configuration carried by a node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum NodeConfig {
    /// Nothing to configure
    #[default]
    Empty,
    /// Prompt text typed into the node
    Prompt(String),
}

impl NodeConfig {
    /// The configured prompt, if this node has one and it is not blank
    pub fn prompt(&self) -> Option<&str> {
        match self {
            Self::Prompt(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

/// Node type definition
#[derive(Debug, Clone)]
pub struct NodeType {
    /// Kind this definition describes
    pub kind: NodeKind,
    /// Unique type identifier
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: &'static str,
    /// Input ports
    pub inputs: &'static [Port],
    /// Output ports
    pub outputs: &'static [Port],
}

impl NodeType {
    /// Build the definition of a kind
    pub fn of(kind: NodeKind) -> Self {
        Self {
            kind,
            id: kind.type_id(),
            name: kind.display_name(),
            category: kind.category(),
            description: kind.description(),
            inputs: kind.inputs(),
            outputs: kind.outputs(),
        }
    }

    /// Whether this type exposes a port with `schema` on the `direction` side
    pub fn has_port(&self, schema: Schema, direction: PortDirection) -> bool {
        self.kind.port_with(schema, direction).is_some()
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Node kind
    pub kind: NodeKind,
    /// Display name (can be customized)
    pub name: String,
    /// Position in the graph UI
    pub position: [f32; 2],
    /// Type-specific configuration
    pub config: NodeConfig,
}

impl Node {
    /// Create a new node of a kind
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            name: kind.display_name().to_string(),
            position: [0.0, 0.0],
            config: kind.default_config(),
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Input ports
    pub fn inputs(&self) -> &'static [Port] {
        self.kind.inputs()
    }

    /// Output ports
    pub fn outputs(&self) -> &'static [Port] {
        self.kind.outputs()
    }

    /// Get a port by ID
    pub fn port(&self, port_id: &PortId) -> Option<&'static Port> {
        self.kind.port(port_id)
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &'static Port> {
        self.inputs().iter().chain(self.outputs().iter())
    }
}

/// Registry of available node types
pub struct NodeRegistry {
    /// Registered node types by ID
    types: indexmap::IndexMap<&'static str, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: indexmap::IndexMap::new(),
        }
    }

    /// Registry holding every built-in node kind
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in NodeKind::ALL {
            registry.register(NodeType::of(kind));
        }
        registry
    }

    /// Register a node type
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id, node_type);
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Types exposing a port of `schema` on the `direction` side.
    ///
    /// This is the filter behind the creation menu opened by dropping a
    /// connection on empty canvas: pass the complement of the dragged
    /// port's direction.
    pub fn types_with_port(
        &self,
        schema: Schema,
        direction: PortDirection,
    ) -> impl Iterator<Item = &NodeType> {
        self.types
            .values()
            .filter(move |t| t.has_port(schema, direction))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
