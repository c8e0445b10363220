// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline runtime: graph, data store and node behavior wired together.
//!
//! All graph mutation, publishing and trigger evaluation happen on the
//! thread that owns the [`Pipeline`]. Generative calls run as spawned tasks;
//! their results come back through a channel and are applied by
//! [`Pipeline::pump`] or [`Pipeline::run_until_idle`].
//!
//! Store notifications are not acted on inside the publish call. Each
//! subscriber only queues an [`Inbound`] delivery, and `pump` drains that
//! queue in arrival order, so propagation through the graph is
//! breadth-first and never recursive.

use crate::connection::{Connection, ConnectionId};
use crate::graph::{ConnectionError, Graph};
use crate::node::{ports, NodeConfig, NodeId, NodeKind, NodeRegistry};
use crate::payload::{ImageData, ModelAsset, NodeData, PayloadKey, PortValue, VideoData};
use crate::port::{PortId, Schema};
use crate::services::{
    EnhanceRequest, ImportError, SceneDescription, ServiceError, Services, VideoRequest,
};
use crate::store::{NodeDataEntry, NodeDataStore, Subscriber, SubscriptionHandle};
use crate::trigger::{TriggerDecision, TriggerGate};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Default render resolution
pub const DEFAULT_RENDER_SIZE: (u32, u32) = (1024, 576);

/// Display state of a node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeStatus {
    /// Nothing has run yet
    #[default]
    Idle,
    /// A computation is running
    Working,
    /// Last computation succeeded
    Ready,
    /// Last computation failed
    Failed(String),
}

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Something finished
    Info,
    /// Something failed
    Error,
}

/// Transient, dismissable message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity
    pub level: NotificationLevel,
    /// Node the message is about
    pub node: Option<NodeId>,
    /// Short title
    pub title: String,
    /// One-line description
    pub description: String,
}

/// Misuse of the pipeline API
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The node kind does not support the requested action
    #[error("{kind} node {node} cannot {action}")]
    UnsupportedAction {
        /// Target node
        node: NodeId,
        /// Its kind
        kind: NodeKind,
        /// Requested action
        action: &'static str,
    },

    /// Graph rejected a connection
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// A value delivered to a consumer's input port
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Receiving node
    pub consumer: NodeId,
    /// Receiving port
    pub port: PortId,
    /// Producing node
    pub source: NodeId,
    /// Delivered value
    pub value: PortValue,
}

#[derive(Debug, Clone)]
enum JobInput {
    Skybox(String),
    Enhance(EnhanceRequest),
    Video(VideoRequest),
}

struct Completion {
    node: NodeId,
    key: PayloadKey,
    result: Result<PortValue, ServiceError>,
}

#[derive(Default)]
struct NodeRuntime {
    status: NodeStatus,
    subscriptions: Vec<SubscriptionHandle>,
    /// Incoming connections at the last (re)subscription
    subscribed_to: Vec<Connection>,
    gate: TriggerGate<JobInput>,
    now_playing: Option<VideoData>,
}

/// A running pipeline
pub struct Pipeline {
    graph: Graph,
    registry: NodeRegistry,
    store: Arc<NodeDataStore>,
    services: Services,
    runtime: Handle,
    nodes: HashMap<NodeId, NodeRuntime>,
    inbox: Arc<Mutex<VecDeque<Inbound>>>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
    notifications: Vec<Notification>,
    render_size: (u32, u32),
}

impl Pipeline {
    /// Create a pipeline over `graph`, spawning service calls on `runtime`
    pub fn new(graph: Graph, services: Services, runtime: Handle) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let mut pipeline = Self {
            graph,
            registry: NodeRegistry::builtin(),
            store: Arc::new(NodeDataStore::new()),
            services,
            runtime,
            nodes: HashMap::new(),
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            completion_tx,
            completion_rx,
            in_flight: 0,
            notifications: Vec::new(),
            render_size: DEFAULT_RENDER_SIZE,
        };
        pipeline.sync_subscriptions();
        pipeline
    }

    /// Set the render resolution
    pub fn with_render_size(mut self, width: u32, height: u32) -> Self {
        self.render_size = (width, height);
        self
    }

    /// The graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable graph access.
    ///
    /// Subscriptions catch up with structural changes on the next
    /// [`Pipeline::pump`].
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Node type registry
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Graph and registry together, for driving the connection protocol
    pub fn graph_and_registry(&mut self) -> (&mut Graph, &NodeRegistry) {
        (&mut self.graph, &self.registry)
    }

    /// The shared data store
    pub fn store(&self) -> &Arc<NodeDataStore> {
        &self.store
    }

    /// Latest output of a node
    pub fn output(&self, node: NodeId) -> Option<NodeDataEntry> {
        self.store.read(node)
    }

    /// Display state of a node
    pub fn status(&self, node: NodeId) -> Option<&NodeStatus> {
        self.nodes.get(&node).map(|rt| &rt.status)
    }

    /// Video loaded in a player node
    pub fn now_playing(&self, node: NodeId) -> Option<&VideoData> {
        self.nodes.get(&node).and_then(|rt| rt.now_playing.as_ref())
    }

    /// Take the queued notifications
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Add a node
    pub fn add_node(&mut self, kind: NodeKind, position: [f32; 2]) -> NodeId {
        let id = self.graph.add_node(kind, position);
        self.nodes.entry(id).or_default();
        id
    }

    /// Remove a node, its connections, its store entry and its subscriptions
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), PipelineError> {
        self.graph
            .remove_node(node)
            .ok_or(PipelineError::NodeNotFound(node))?;
        self.teardown(node);
        self.pump();
        Ok(())
    }

    /// Connect an output port to an input port
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: PortId,
        to_node: NodeId,
        to_port: PortId,
    ) -> Result<ConnectionId, PipelineError> {
        let id = self.graph.connect(from_node, from_port, to_node, to_port)?;
        self.pump();
        Ok(id)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<Connection> {
        let removed = self.graph.disconnect(connection);
        self.pump();
        removed
    }

    fn kind_of(&self, node: NodeId) -> Result<NodeKind, PipelineError> {
        self.graph
            .node(node)
            .map(|n| n.kind)
            .ok_or(PipelineError::NodeNotFound(node))
    }

    fn require_kind(
        &self,
        node: NodeId,
        action: &'static str,
        allowed: &[NodeKind],
    ) -> Result<NodeKind, PipelineError> {
        let kind = self.kind_of(node)?;
        if allowed.contains(&kind) {
            Ok(kind)
        } else {
            Err(PipelineError::UnsupportedAction { node, kind, action })
        }
    }

    /// Value currently reaching an input port, if it is connected and the
    /// producer has published
    pub fn input_value(&self, node: NodeId, port: &PortId) -> Option<PortValue> {
        let schema = self.graph.node(node)?.port(port)?.schema;
        let connection = self.graph.connections_to(node, port).next()?;
        self.store.read_value(connection.from_node, schema)
    }

    fn prompt_for(&self, node: NodeId) -> Option<String> {
        self.input_value(node, &ports::PROMPT_INPUT)
            .and_then(|v| v.as_text().map(str::to_string))
            .filter(|text| !text.trim().is_empty())
            .or_else(|| {
                self.graph
                    .node(node)
                    .and_then(|n| n.config.prompt().map(str::to_string))
            })
    }

    /// Edit a node's prompt. Text prompt nodes publish the new text.
    pub fn set_prompt(&mut self, node: NodeId, text: impl Into<String>) -> Result<(), PipelineError> {
        let kind = self.require_kind(
            node,
            "take a prompt",
            &[
                NodeKind::TextPrompt,
                NodeKind::SkyboxGenerator,
                NodeKind::AiImageEnhancer,
                NodeKind::VideoGenerator,
            ],
        )?;
        let text = text.into();
        if let Some(n) = self.graph.node_mut(node) {
            n.config = NodeConfig::Prompt(text.clone());
        }
        if kind == NodeKind::TextPrompt {
            self.publish(node, PortValue::Text(text));
        }
        self.pump();
        Ok(())
    }

    /// Import a model file into a model loader node.
    ///
    /// Import failures are reported on the node; the returned flag tells
    /// whether a model was published.
    pub fn load_model(
        &mut self,
        node: NodeId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<bool, PipelineError> {
        self.require_kind(node, "load a model", &[NodeKind::ModelLoader])?;
        let imported = self.services.importer.import(file_name, bytes);
        Ok(self.apply_import(node, imported))
    }

    /// Import a model file from disk into a model loader node.
    ///
    /// Oversized files are rejected before they are read.
    pub fn load_model_file(&mut self, node: NodeId, path: &Path) -> Result<bool, PipelineError> {
        self.require_kind(node, "load a model", &[NodeKind::ModelLoader])?;
        let imported = self.services.importer.import_path(path);
        Ok(self.apply_import(node, imported))
    }

    fn apply_import(&mut self, node: NodeId, imported: Result<ModelAsset, ImportError>) -> bool {
        match imported {
            Ok(model) => {
                tracing::info!(%node, name = %model.name, "Model loaded");
                self.set_status(node, NodeStatus::Ready);
                self.publish(node, PortValue::Model3D(model));
                self.pump();
                true
            }
            Err(err) => {
                self.fail(node, import_title(&err), err.to_string());
                false
            }
        }
    }

    /// Render the connected model and skybox
    pub fn render(&mut self, node: NodeId) -> Result<bool, PipelineError> {
        self.require_kind(node, "render", &[NodeKind::SceneRenderer])?;

        let Some(model) = self
            .input_value(node, &ports::MODEL_INPUT)
            .and_then(|v| v.as_model().cloned())
        else {
            self.fail_with(node, ServiceError::MissingInput("connect a 3D model first".into()));
            return Ok(false);
        };
        let skybox = self
            .input_value(node, &ports::SKYBOX_INPUT)
            .and_then(|v| v.as_image().cloned());

        let scene = SceneDescription {
            model,
            skybox,
            width: self.render_size.0,
            height: self.render_size.1,
        };
        match self.services.renderer.render(&scene) {
            Ok(image) => {
                tracing::info!(%node, width = image.width, height = image.height, "Scene rendered");
                self.set_status(node, NodeStatus::Ready);
                self.publish(node, PortValue::RenderedImage(image));
                self.pump();
                Ok(true)
            }
            Err(err) => {
                self.fail_with(node, err);
                Ok(false)
            }
        }
    }

    /// Generate a skybox from the connected or configured prompt
    pub fn generate_skybox(&mut self, node: NodeId) -> Result<bool, PipelineError> {
        self.require_kind(node, "generate a skybox", &[NodeKind::SkyboxGenerator])?;

        let Some(prompt) = self.prompt_for(node) else {
            self.fail_with(node, ServiceError::MissingInput("enter a skybox prompt".into()));
            return Ok(false);
        };
        let key = request_key(&[], Some(&prompt));
        Ok(self.offer_manual(node, key, JobInput::Skybox(prompt)))
    }

    /// Enhance the connected rendered image
    pub fn enhance(&mut self, node: NodeId) -> Result<bool, PipelineError> {
        self.require_kind(
            node,
            "enhance",
            &[NodeKind::AiImageEnhancer, NodeKind::AiEnhancedImage],
        )?;

        let Some(image) = self.input_value(node, &ports::RENDERED_IMAGE_INPUT) else {
            self.fail_with(node, ServiceError::MissingInput("render an image first".into()));
            return Ok(false);
        };
        let prompt = self.prompt_for(node);
        let key = enhance_key(&image, prompt.as_deref());
        let Some(image) = image.as_image().cloned() else {
            return Ok(false);
        };
        Ok(self.offer_manual(node, key, JobInput::Enhance(EnhanceRequest { image, prompt })))
    }

    /// Generate a video from the connected enhanced image
    pub fn generate_video(&mut self, node: NodeId) -> Result<bool, PipelineError> {
        self.require_kind(node, "generate a video", &[NodeKind::VideoGenerator])?;

        let Some(image) = self.input_value(node, &ports::ENHANCED_IMAGE_INPUT) else {
            self.fail_with(node, ServiceError::MissingInput("connect an enhanced image first".into()));
            return Ok(false);
        };
        let prompt = self.prompt_for(node);
        let key = request_key(&[&image], prompt.as_deref());
        let Some(image) = image.as_image().cloned() else {
            return Ok(false);
        };
        Ok(self.offer_manual(node, key, JobInput::Video(VideoRequest { image, prompt })))
    }

    fn offer_manual(&mut self, node: NodeId, key: PayloadKey, input: JobInput) -> bool {
        let decision = self.nodes.entry(node).or_default().gate.offer_manual(key, input.clone());
        tracing::debug!(%node, ?decision, "Manual trigger");
        if decision.should_start() {
            self.start_job(node, key, input);
        }
        decision.should_start()
    }

    /// Apply everything that is ready: subscription changes, finished
    /// service calls and queued deliveries. Never blocks.
    pub fn pump(&mut self) {
        loop {
            self.sync_subscriptions();

            let mut progressed = false;
            while let Ok(completion) = self.completion_rx.try_recv() {
                self.apply_completion(completion);
                progressed = true;
            }

            loop {
                let next = self.inbox.lock().pop_front();
                let Some(inbound) = next else { break };
                self.handle_inbound(inbound);
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    /// Pump until every running service call has completed
    pub async fn run_until_idle(&mut self) {
        self.pump();
        while self.in_flight > 0 {
            let Some(completion) = self.completion_rx.recv().await else {
                break;
            };
            self.apply_completion(completion);
            self.pump();
        }
    }

    /// Bring every node's subscriptions in line with its incoming connections
    pub fn sync_subscriptions(&mut self) {
        let gone: Vec<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| self.graph.node(*id).is_none())
            .collect();
        for node in gone {
            self.teardown(node);
        }

        let ids: Vec<NodeId> = self.graph.node_ids().collect();
        for node in ids {
            let incoming: Vec<Connection> = self
                .graph
                .nodes_targeting(node)
                .into_iter()
                .cloned()
                .collect();
            let runtime = self.nodes.entry(node).or_default();
            if runtime.subscribed_to != incoming {
                self.resubscribe(node, incoming);
            }
        }
    }

    fn resubscribe(&mut self, node: NodeId, incoming: Vec<Connection>) {
        let Some(runtime) = self.nodes.get_mut(&node) else {
            return;
        };

        // Tear down first so no producer ever holds two registrations
        for handle in runtime.subscriptions.drain(..) {
            self.store.unsubscribe(handle);
        }

        let Some(kind) = self.graph.node(node).map(|n| n.kind) else {
            return;
        };
        for connection in &incoming {
            let Some(port) = kind.port(&connection.to_port) else {
                continue;
            };
            let schema = port.schema;
            let handle = self.store.subscribe(
                connection.from_node,
                delivery(Arc::clone(&self.inbox), node, port.id.clone(), schema),
            );
            runtime.subscriptions.push(handle);

            // Subscribing does not replay; pick up what is already there
            if let Some(value) = self.store.read_value(connection.from_node, schema) {
                self.inbox.lock().push_back(Inbound {
                    consumer: node,
                    port: port.id.clone(),
                    source: connection.from_node,
                    value,
                });
            }
        }

        tracing::debug!(%node, sources = incoming.len(), "Resubscribed");
        runtime.subscribed_to = incoming;
    }

    fn teardown(&mut self, node: NodeId) {
        if let Some(runtime) = self.nodes.remove(&node) {
            for handle in runtime.subscriptions {
                self.store.unsubscribe(handle);
            }
        }
        self.store.remove_node(node);
        self.inbox.lock().retain(|i| i.consumer != node);
        tracing::debug!(%node, "Node torn down");
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        let Some(kind) = self.graph.node(inbound.consumer).map(|n| n.kind) else {
            return;
        };
        let node = inbound.consumer;

        match (kind, &inbound.value) {
            (NodeKind::AiEnhancedImage, PortValue::RenderedImage(image)) => {
                // Same key as a manual enhance of this image
                let prompt = self.prompt_for(node);
                let key = enhance_key(&inbound.value, prompt.as_deref());
                let input = JobInput::Enhance(EnhanceRequest {
                    image: image.clone(),
                    prompt,
                });
                let decision = self.nodes.entry(node).or_default().gate.offer(key, input.clone());
                tracing::debug!(%node, source = %inbound.source, ?decision, "Rendered image received");
                if decision == TriggerDecision::Start {
                    self.start_job(node, key, input);
                }
            }
            (NodeKind::VideoPlayer, PortValue::GeneratedVideo(video)) => {
                let runtime = self.nodes.entry(node).or_default();
                if runtime.now_playing.as_ref() != Some(video) {
                    tracing::info!(%node, uri = %video.uri, "Loading video for playback");
                    runtime.now_playing = Some(video.clone());
                    runtime.status = NodeStatus::Ready;
                }
            }
            _ => {
                tracing::trace!(%node, port = %inbound.port, "Input updated");
            }
        }
    }

    fn start_job(&mut self, node: NodeId, key: PayloadKey, input: JobInput) {
        let future: BoxFuture<'static, Result<PortValue, ServiceError>> = match input {
            JobInput::Skybox(prompt) => {
                let call = self.services.text_to_image.generate(prompt);
                Box::pin(async move { call.await.map(PortValue::SkyboxTexture) })
            }
            JobInput::Enhance(request) => {
                let call = self.services.enhancer.enhance(request);
                Box::pin(async move { call.await.map(PortValue::EnhancedImage) })
            }
            JobInput::Video(request) => {
                let call = self.services.image_to_video.generate(request);
                Box::pin(async move { call.await.map(PortValue::GeneratedVideo) })
            }
        };

        tracing::info!(%node, "Generation started");
        self.set_status(node, NodeStatus::Working);
        self.in_flight += 1;

        let tx = self.completion_tx.clone();
        self.runtime.spawn(async move {
            // A panicking service still has to report back, or the node stays Working
            let result = AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(ServiceError::Provider("service call panicked".into())));
            // Receiver only closes when the pipeline is dropped
            let _ = tx.send(Completion { node, key, result });
        });
    }

    fn apply_completion(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Completion { node, key, result } = completion;

        let Some(runtime) = self.nodes.get_mut(&node) else {
            tracing::debug!(%node, "Result for removed node dropped");
            return;
        };
        if !runtime.gate.is_current(key) {
            tracing::debug!(%node, "Stale result dropped");
            return;
        }

        let next = match result {
            Ok(value) => {
                let next = runtime.gate.finish(key, true);
                runtime.status = NodeStatus::Ready;
                tracing::info!(%node, schema = %value.schema(), "Generation finished");
                self.notify(
                    NotificationLevel::Info,
                    Some(node),
                    completion_title(value.schema()),
                    format!("Node {node} published a new {}", value.schema()),
                );
                self.publish(node, value);
                next
            }
            Err(err) => {
                let next = runtime.gate.finish(key, false);
                self.fail_with(node, err);
                next
            }
        };

        if let Some((next_key, input)) = next {
            self.start_job(node, next_key, input);
        }
    }

    fn publish(&self, node: NodeId, value: PortValue) {
        self.store.publish(node, NodeData::single(value));
    }

    fn set_status(&mut self, node: NodeId, status: NodeStatus) {
        self.nodes.entry(node).or_default().status = status;
    }

    fn fail_with(&mut self, node: NodeId, err: ServiceError) {
        self.fail(node, err.title(), err.to_string());
    }

    fn fail(&mut self, node: NodeId, title: &str, description: String) {
        tracing::warn!(%node, "{title}: {description}");
        self.set_status(node, NodeStatus::Failed(description.clone()));
        self.notify(NotificationLevel::Error, Some(node), title, description);
    }

    fn notify(&mut self, level: NotificationLevel, node: Option<NodeId>, title: &str, description: String) {
        self.notifications.push(Notification {
            level,
            node,
            title: title.to_string(),
            description,
        });
    }
}

/// Subscriber that queues a delivery for `consumer` when the producer
/// publishes a value of `schema`
fn delivery(
    inbox: Arc<Mutex<VecDeque<Inbound>>>,
    consumer: NodeId,
    port: PortId,
    schema: Schema,
) -> Subscriber {
    Arc::new(move |entry: &NodeDataEntry| {
        if let Some(value) = entry.get(schema) {
            inbox.lock().push_back(Inbound {
                consumer,
                port: port.clone(),
                source: entry.node,
                value: value.clone(),
            });
        }
    })
}

fn request_key(inputs: &[&PortValue], prompt: Option<&str>) -> PayloadKey {
    let mut hasher = DefaultHasher::new();
    for input in inputs {
        input.key().hash(&mut hasher);
    }
    prompt.hash(&mut hasher);
    PayloadKey(hasher.finish())
}

fn enhance_key(image: &PortValue, prompt: Option<&str>) -> PayloadKey {
    request_key(&[image], prompt)
}

fn import_title(err: &ImportError) -> &'static str {
    match err {
        ImportError::UnsupportedFileType(_) => "Unsupported file type",
        ImportError::FileTooLarge { .. } => "File too large",
        ImportError::ParseFailure(_) => "Could not read model",
        ImportError::Unreadable(_) => "Could not open model file",
    }
}

fn completion_title(schema: Schema) -> &'static str {
    match schema {
        Schema::SkyboxTexture => "Skybox ready",
        Schema::EnhancedImage => "Enhancement complete",
        Schema::GeneratedVideo => "Video ready",
        _ => "Output ready",
    }
}

/// First image in a published entry
pub fn published_image(entry: &NodeDataEntry) -> Option<&ImageData> {
    entry.data.values().find_map(PortValue::as_image)
}
