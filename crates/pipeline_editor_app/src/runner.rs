// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builds the default pipeline and drives it from model to playback.

use crate::config::AppConfig;
use pipeline_editor_graph::{
    ports, CycleError, Graph, GraphFileError, NodeId, NodeKind, NodeStatus, Notification, NotificationLevel,
    Pipeline, PipelineError,
};
use pipeline_editor_services::{ServiceFactory, SettingsError, SettingsStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;

/// Built-in model used when no file is configured
const SAMPLE_CUBE_OBJ: &str = "\
# unit cube
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 0 0 1
v 1 0 1
v 1 1 1
v 0 1 1
f 1 2 3 4
f 5 6 7 8
f 1 2 6 5
f 2 3 7 6
f 3 4 8 7
f 4 1 5 8
";

/// Runner error
#[derive(Debug, Error)]
pub enum RunError {
    /// Settings could not be opened
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Graph file could not be written
    #[error("Failed to write graph: {0}")]
    Io(#[from] std::io::Error),

    /// Graph could not be built
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Graph could not be saved
    #[error("Failed to save graph: {0}")]
    GraphFile(#[from] GraphFileError),

    /// Graph has no evaluation order
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Node IDs of the default pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineNodes {
    /// Model loader (the initial node)
    pub loader: NodeId,
    /// Skybox generator
    pub skybox: NodeId,
    /// Scene renderer
    pub renderer: NodeId,
    /// Auto enhancer
    pub enhanced: NodeId,
    /// Motion prompt
    pub video_prompt: NodeId,
    /// Video generator
    pub video: NodeId,
    /// Video player
    pub player: NodeId,
}

/// What a run produced
#[derive(Debug)]
pub struct RunSummary {
    /// Node IDs
    pub nodes: PipelineNodes,
    /// Final status of every node, producers before consumers
    pub statuses: Vec<(NodeId, NodeKind, NodeStatus)>,
    /// Notifications raised during the run
    pub notifications: Vec<Notification>,
    /// URI of the video loaded into the player
    pub video_uri: Option<String>,
}

/// Lay out model loader, skybox, renderer, enhancer, video and player
pub fn build_default_pipeline(pipeline: &mut Pipeline, config: &AppConfig) -> Result<PipelineNodes, PipelineError> {
    let existing = pipeline
        .graph()
        .nodes()
        .find(|node| node.kind == NodeKind::ModelLoader)
        .map(|node| node.id);
    let loader = match existing {
        Some(id) => id,
        None => pipeline.add_node(NodeKind::ModelLoader, [100.0, 100.0]),
    };
    let skybox = pipeline.add_node(NodeKind::SkyboxGenerator, [100.0, 300.0]);
    let renderer = pipeline.add_node(NodeKind::SceneRenderer, [400.0, 150.0]);
    let enhanced = pipeline.add_node(NodeKind::AiEnhancedImage, [700.0, 150.0]);
    let video_prompt = pipeline.add_node(NodeKind::TextPrompt, [700.0, 350.0]);
    let video = pipeline.add_node(NodeKind::VideoGenerator, [1000.0, 150.0]);
    let player = pipeline.add_node(NodeKind::VideoPlayer, [1300.0, 150.0]);

    pipeline.connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)?;
    pipeline.connect(skybox, ports::SKYBOX_OUTPUT, renderer, ports::SKYBOX_INPUT)?;
    pipeline.connect(renderer, ports::RENDERED_IMAGE_OUTPUT, enhanced, ports::RENDERED_IMAGE_INPUT)?;
    pipeline.connect(enhanced, ports::ENHANCED_IMAGE_OUTPUT, video, ports::ENHANCED_IMAGE_INPUT)?;
    pipeline.connect(video_prompt, ports::TEXT_OUTPUT, video, ports::PROMPT_INPUT)?;
    pipeline.connect(video, ports::VIDEO_OUTPUT, player, ports::VIDEO_INPUT)?;

    pipeline.set_prompt(skybox, config.skybox_prompt.clone())?;
    pipeline.set_prompt(video_prompt, config.video_prompt.clone())?;

    tracing::info!(
        nodes = pipeline.graph().node_count(),
        connections = pipeline.graph().connection_count(),
        "Default pipeline built"
    );
    Ok(PipelineNodes {
        loader,
        skybox,
        renderer,
        enhanced,
        video_prompt,
        video,
        player,
    })
}

/// Run the full pipeline once
pub async fn run(config: &AppConfig) -> Result<RunSummary, RunError> {
    let settings = match &config.settings_path {
        Some(path) => SettingsStore::open(path)?,
        None => SettingsStore::in_memory(),
    };
    let services = ServiceFactory::new(config.services.clone(), Arc::new(settings)).build();

    let mut pipeline = Pipeline::new(
        Graph::with_default_node("Model to video"),
        services,
        Handle::current(),
    );
    let nodes = build_default_pipeline(&mut pipeline, config)?;

    match &config.model_path {
        Some(path) => pipeline.load_model_file(nodes.loader, path)?,
        None => pipeline.load_model(nodes.loader, "cube.obj", SAMPLE_CUBE_OBJ.as_bytes().to_vec())?,
    };

    pipeline.generate_skybox(nodes.skybox)?;
    pipeline.run_until_idle().await;

    // Rendering publishes the image; the enhancer picks it up on its own
    pipeline.render(nodes.renderer)?;
    pipeline.run_until_idle().await;

    pipeline.generate_video(nodes.video)?;
    pipeline.run_until_idle().await;

    if let Some(path) = &config.graph_output {
        std::fs::write(path, pipeline.graph().to_ron()?)?;
        tracing::info!(path = %path.display(), "Graph saved");
    }

    let graph = pipeline.graph();
    let statuses = graph
        .topological_order()?
        .into_iter()
        .filter_map(|id| {
            let node = graph.node(id)?;
            let status = pipeline.status(id).cloned().unwrap_or_default();
            Some((id, node.kind, status))
        })
        .collect();
    Ok(RunSummary {
        nodes,
        statuses,
        notifications: pipeline.drain_notifications(),
        video_uri: pipeline.now_playing(nodes.player).map(|video| video.uri.clone()),
    })
}

/// Log a run summary
pub fn report(summary: &RunSummary) {
    for note in &summary.notifications {
        match note.level {
            NotificationLevel::Info => tracing::info!("{}: {}", note.title, note.description),
            NotificationLevel::Error => tracing::error!("{}: {}", note.title, note.description),
        }
    }
    for (id, kind, status) in &summary.statuses {
        tracing::info!(node = %id, %kind, ?status, "Node status");
    }
    match &summary.video_uri {
        Some(uri) => tracing::info!(%uri, "Video ready for playback"),
        None => tracing::warn!("No video was produced"),
    }
}
