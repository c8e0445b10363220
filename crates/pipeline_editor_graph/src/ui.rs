// SPDX-License-Identifier: MIT OR Apache-2.0
//! Interactive egui editor for a [`Pipeline`].
//!
//! Features:
//! - Node rendering with typed ports and per-node controls
//! - Connection rendering (bezier curves, colored by schema)
//! - Pan/zoom navigation and node dragging
//! - Drag-to-connect driven by [`ConnectionProtocol`]
//! - Node creation menu on canvas drop or right click
//!
//! Hit testing works in graph space and is exposed as free functions so
//! hosts and tests can classify pointer positions without a frame.

use crate::connection::{ConnectionId, Endpoint};
use crate::graph::Graph;
use crate::interaction::{ConnectionDrag, ConnectionOutcome, ConnectionProtocol, DropTarget};
use crate::node::{Node, NodeCategory, NodeConfig, NodeId, NodeKind};
use crate::pipeline::{NodeStatus, Pipeline, PipelineError};
use crate::port::{Port, PortDirection};
use egui::{Color32, Pos2, Rect, Stroke, Vec2};
use std::collections::{HashMap, HashSet};

/// Node visual dimensions
const NODE_WIDTH: f32 = 200.0;
const NODE_HEADER_HEIGHT: f32 = 24.0;
const NODE_BODY_HEIGHT: f32 = 52.0;
const PORT_HEIGHT: f32 = 22.0;
const PORT_RADIUS: f32 = 6.0;
const PORT_PADDING: f32 = 12.0;
const NODE_ROUNDING: f32 = 6.0;
const NODE_SHADOW_OFFSET: f32 = 3.0;

/// Connection visual parameters
const BEZIER_CURVATURE: f32 = 50.0;
const CONNECTION_THICKNESS: f32 = 2.5;
const HANDLE_RADIUS: f32 = 5.0;

const GRID_SPACING: f32 = 20.0;

/// Something the host application has to do for the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorRequest {
    /// Pick a model file for a loader node and pass it to
    /// [`Pipeline::load_model`]
    OpenModelFile(NodeId),
}

/// Node-level controls clicked during a frame, applied after drawing
#[derive(Debug, Clone)]
enum NodeAction {
    SetPrompt(NodeId, String),
    GenerateSkybox(NodeId),
    Render(NodeId),
    Enhance(NodeId),
    GenerateVideo(NodeId),
}

/// Graph editor interaction mode (connection drags live in the protocol)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InteractionMode {
    /// Selecting, clicking controls
    #[default]
    Normal,
    /// Panning the view
    Panning,
    /// Dragging selected nodes
    DraggingNodes,
}

/// Graph editor UI state
pub struct GraphEditorState {
    /// Current pan offset (graph space)
    pub pan: Vec2,
    /// Current zoom level
    pub zoom: f32,
    /// Selected nodes
    pub selected_nodes: HashSet<NodeId>,
    /// Show grid
    pub show_grid: bool,
    mode: InteractionMode,
    protocol: ConnectionProtocol,
    last_mouse_pos: Pos2,
    /// Prompt text being edited, per node
    prompts: HashMap<NodeId, String>,
    last_outcome: Option<ConnectionOutcome>,
}

impl GraphEditorState {
    /// Create a new graph editor state
    pub fn new() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
            selected_nodes: HashSet::new(),
            show_grid: true,
            mode: InteractionMode::Normal,
            protocol: ConnectionProtocol::new(),
            last_mouse_pos: Pos2::ZERO,
            prompts: HashMap::new(),
            last_outcome: None,
        }
    }

    /// Current interaction mode
    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// The connection protocol
    pub fn protocol(&self) -> &ConnectionProtocol {
        &self.protocol
    }

    /// Outcome of the most recent connection gesture
    pub fn last_outcome(&self) -> Option<&ConnectionOutcome> {
        self.last_outcome.as_ref()
    }

    /// Convert screen position to graph position
    pub fn screen_to_graph(&self, screen_pos: Pos2, rect: Rect) -> Pos2 {
        let center = rect.center();
        Pos2::new(
            (screen_pos.x - center.x) / self.zoom - self.pan.x,
            (screen_pos.y - center.y) / self.zoom - self.pan.y,
        )
    }

    /// Convert graph position to screen position
    pub fn graph_to_screen(&self, graph_pos: Pos2, rect: Rect) -> Pos2 {
        let center = rect.center();
        Pos2::new(
            (graph_pos.x + self.pan.x) * self.zoom + center.x,
            (graph_pos.y + self.pan.y) * self.zoom + center.y,
        )
    }

    /// Select a node (optionally add to selection)
    pub fn select_node(&mut self, node_id: NodeId, add_to_selection: bool) {
        if !add_to_selection {
            self.selected_nodes.clear();
        }
        self.selected_nodes.insert(node_id);
    }

    /// Remove selected nodes from the pipeline
    pub fn delete_selected(&mut self, pipeline: &mut Pipeline) {
        for node_id in self.selected_nodes.drain() {
            self.prompts.remove(&node_id);
            if let Err(err) = pipeline.remove_node(node_id) {
                tracing::debug!("Delete skipped: {err}");
            }
        }
    }

    fn record(&mut self, outcome: ConnectionOutcome) {
        match &outcome {
            ConnectionOutcome::Rejected(err) => tracing::info!("Connection rejected: {err}"),
            ConnectionOutcome::Ignored => {}
            other => tracing::debug!(outcome = ?other, "Connection gesture"),
        }
        self.last_outcome = Some(outcome);
    }

    /// Render the editor and apply the frame's interactions to `pipeline`.
    ///
    /// Returns requests only the host can fulfil, such as file picking.
    pub fn ui(&mut self, ui: &mut egui::Ui, pipeline: &mut Pipeline) -> Vec<EditorRequest> {
        let rect = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        if self.show_grid {
            self.draw_grid(&painter, rect);
        }

        self.handle_input(ui, &response, rect, pipeline);

        self.draw_connections(&painter, rect, pipeline.graph());
        if let Some(drag) = self.protocol.drag() {
            self.draw_connection_drag(&painter, rect, pipeline.graph(), drag);
        }

        let mut actions = Vec::new();
        let mut requests = Vec::new();
        self.draw_nodes(ui, &painter, rect, pipeline, &mut actions, &mut requests);
        self.show_creation_menu(ui.ctx(), rect, pipeline);

        for action in actions {
            if let Err(err) = apply_action(pipeline, action) {
                tracing::warn!("Node action failed: {err}");
            }
        }
        pipeline.pump();

        self.draw_status_bar(ui, rect, pipeline.graph());
        requests
    }

    fn draw_grid(&self, painter: &egui::Painter, rect: Rect) {
        let spacing = GRID_SPACING * self.zoom;
        if spacing < 4.0 {
            return;
        }
        let color = Color32::from_rgba_unmultiplied(60, 60, 60, 100);
        let offset = self.graph_to_screen(Pos2::ZERO, rect);

        let mut x = rect.left() + (offset.x - rect.left()).rem_euclid(spacing);
        while x < rect.right() {
            painter.line_segment(
                [Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())],
                Stroke::new(1.0, color),
            );
            x += spacing;
        }
        let mut y = rect.top() + (offset.y - rect.top()).rem_euclid(spacing);
        while y < rect.bottom() {
            painter.line_segment(
                [Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)],
                Stroke::new(1.0, color),
            );
            y += spacing;
        }
    }

    fn handle_input(
        &mut self,
        ui: &egui::Ui,
        response: &egui::Response,
        rect: Rect,
        pipeline: &mut Pipeline,
    ) {
        let mouse_pos = ui.input(|i| i.pointer.hover_pos().unwrap_or(self.last_mouse_pos));
        let delta = mouse_pos - self.last_mouse_pos;
        self.last_mouse_pos = mouse_pos;
        let graph_pos = self.screen_to_graph(mouse_pos, rect);
        let point = [graph_pos.x, graph_pos.y];

        // Zoom with scroll wheel, toward the pointer
        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll != 0.0 && rect.contains(mouse_pos) {
            let old_zoom = self.zoom;
            self.zoom = (self.zoom * (1.0 + scroll * 0.001)).clamp(0.2, 3.0);
            if self.zoom != old_zoom {
                let zoom_ratio = self.zoom / old_zoom;
                self.pan.x += graph_pos.x * (1.0 - zoom_ratio);
                self.pan.y += graph_pos.y * (1.0 - zoom_ratio);
            }
        }

        if ui.input(|i| i.key_pressed(egui::Key::Escape)) && !self.protocol.is_idle() {
            let outcome = self.protocol.cancel(pipeline.graph_mut());
            self.record(outcome);
            return;
        }

        if self.protocol.drag().is_some() {
            self.protocol.update_pointer(point);
            if response.drag_stopped() {
                let target = drop_target(pipeline.graph(), graph_pos);
                let (graph, registry) = pipeline.graph_and_registry();
                let outcome = self.protocol.release(graph, registry, target);
                self.record(outcome);
                pipeline.pump();
            }
            return;
        }

        match self.mode {
            InteractionMode::Normal => {
                if response.dragged_by(egui::PointerButton::Middle) {
                    self.mode = InteractionMode::Panning;
                }

                if response.drag_started_by(egui::PointerButton::Primary) {
                    let graph = pipeline.graph();
                    let port = port_at(graph, graph_pos);
                    let connection = connection_at(graph, graph_pos);
                    let body = node_at(graph, graph_pos);

                    if let Some(endpoint) = port {
                        let outcome =
                            self.protocol.begin_drag(pipeline.graph_mut(), endpoint.node, endpoint.port);
                        self.protocol.update_pointer(point);
                        self.record(outcome);
                    } else if let Some(connection) = connection {
                        let outcome = self.protocol.begin_redrag(pipeline.graph_mut(), connection);
                        self.protocol.update_pointer(point);
                        self.record(outcome);
                    } else if let Some(node_id) = body {
                        if !self.selected_nodes.contains(&node_id) {
                            self.select_node(node_id, false);
                        }
                        self.mode = InteractionMode::DraggingNodes;
                    }
                }

                if response.clicked() {
                    if self.protocol.menu().is_some() {
                        let outcome = self.protocol.dismiss_menu(pipeline.graph_mut());
                        self.record(outcome);
                    }
                    let shift_held = ui.input(|i| i.modifiers.shift);
                    match node_at(pipeline.graph(), graph_pos) {
                        Some(node_id) => self.select_node(node_id, shift_held),
                        None if !shift_held => self.selected_nodes.clear(),
                        None => {}
                    }
                }

                if response.secondary_clicked() && self.protocol.is_idle() {
                    let (graph, registry) = pipeline.graph_and_registry();
                    self.protocol.open_menu(graph, registry, point);
                }
            }

            InteractionMode::Panning => {
                if response.dragged() {
                    self.pan += delta / self.zoom;
                }
                if response.drag_stopped() {
                    self.mode = InteractionMode::Normal;
                }
            }

            InteractionMode::DraggingNodes => {
                if response.dragged() {
                    let graph_delta = delta / self.zoom;
                    for node_id in &self.selected_nodes {
                        if let Some(node) = pipeline.graph_mut().node_mut(*node_id) {
                            node.position[0] += graph_delta.x;
                            node.position[1] += graph_delta.y;
                        }
                    }
                }
                if response.drag_stopped() {
                    self.mode = InteractionMode::Normal;
                }
            }
        }

        let delete = ui.input(|i| i.key_pressed(egui::Key::Delete));
        if delete && !ui.ctx().wants_keyboard_input() && self.protocol.is_idle() {
            self.delete_selected(pipeline);
        }
    }

    fn draw_connections(&self, painter: &egui::Painter, rect: Rect, graph: &Graph) {
        for connection in graph.connections() {
            let (Some(from), Some(to)) = (graph.node(connection.from_node), graph.node(connection.to_node))
            else {
                continue;
            };
            let (Some(from_port), Some(to_port)) =
                (from.port(&connection.from_port), to.port(&connection.to_port))
            else {
                continue;
            };

            let from_screen = self.graph_to_screen(port_center(from, from_port), rect);
            let to_screen = self.graph_to_screen(port_center(to, to_port), rect);
            let color = schema_color(from_port);
            self.draw_bezier_connection(painter, from_screen, to_screen, color);
            painter.circle_filled(
                from_screen.lerp(to_screen, 0.5),
                HANDLE_RADIUS * self.zoom,
                color,
            );
        }
    }

    fn draw_bezier_connection(&self, painter: &egui::Painter, from: Pos2, to: Pos2, color: Color32) {
        let distance = (to.x - from.x).abs();
        let curvature = (BEZIER_CURVATURE * self.zoom).min(distance * 0.5).max(20.0 * self.zoom);

        let ctrl1 = Pos2::new(from.x + curvature, from.y);
        let ctrl2 = Pos2::new(to.x - curvature, to.y);

        let points = bezier_points(from, ctrl1, ctrl2, to, 32);
        for pair in points.windows(2) {
            painter.line_segment(
                [pair[0], pair[1]],
                Stroke::new(CONNECTION_THICKNESS * self.zoom, color),
            );
        }
    }

    fn draw_connection_drag(
        &self,
        painter: &egui::Painter,
        rect: Rect,
        graph: &Graph,
        drag: &ConnectionDrag,
    ) {
        let Some(node) = graph.node(drag.origin.node) else {
            return;
        };
        let Some(port) = node.port(&drag.origin.port) else {
            return;
        };
        let anchor = self.graph_to_screen(port_center(node, port), rect);
        let pointer = self.graph_to_screen(Pos2::new(drag.current_pos[0], drag.current_pos[1]), rect);
        let color = schema_color(port);

        match drag.origin.direction {
            PortDirection::Output => self.draw_bezier_connection(painter, anchor, pointer, color),
            PortDirection::Input => self.draw_bezier_connection(painter, pointer, anchor, color),
        }
    }

    fn draw_nodes(
        &mut self,
        ui: &mut egui::Ui,
        painter: &egui::Painter,
        rect: Rect,
        pipeline: &Pipeline,
        actions: &mut Vec<NodeAction>,
        requests: &mut Vec<EditorRequest>,
    ) {
        let mouse_pos = ui.input(|i| i.pointer.hover_pos().unwrap_or(Pos2::ZERO));

        for node in pipeline.graph().nodes() {
            let node_rect = node_rect(node);
            let screen_rect = Rect::from_min_size(
                self.graph_to_screen(node_rect.min, rect),
                node_rect.size() * self.zoom,
            );
            if !screen_rect.intersects(rect) {
                continue;
            }

            let shadow_rect = screen_rect.translate(Vec2::splat(NODE_SHADOW_OFFSET));
            painter.rect_filled(
                shadow_rect,
                NODE_ROUNDING * self.zoom,
                Color32::from_rgba_unmultiplied(0, 0, 0, 60),
            );

            let is_selected = self.selected_nodes.contains(&node.id);
            let bg_color = if is_selected {
                Color32::from_rgb(60, 70, 90)
            } else {
                Color32::from_rgb(45, 45, 48)
            };
            painter.rect_filled(screen_rect, NODE_ROUNDING * self.zoom, bg_color);

            let header_rect = Rect::from_min_size(
                screen_rect.min,
                Vec2::new(screen_rect.width(), NODE_HEADER_HEIGHT * self.zoom),
            );
            painter.rect_filled(
                header_rect,
                egui::Rounding {
                    nw: NODE_ROUNDING * self.zoom,
                    ne: NODE_ROUNDING * self.zoom,
                    sw: 0.0,
                    se: 0.0,
                },
                category_color(node.kind.category()),
            );
            painter.text(
                header_rect.center(),
                egui::Align2::CENTER_CENTER,
                &node.name,
                egui::FontId::proportional(12.0 * self.zoom),
                Color32::WHITE,
            );

            let status = pipeline.status(node.id).cloned().unwrap_or_default();
            painter.circle_filled(
                Pos2::new(header_rect.right() - 10.0 * self.zoom, header_rect.center().y),
                4.0 * self.zoom,
                status_color(&status),
            );

            if is_selected {
                painter.rect_stroke(
                    screen_rect,
                    NODE_ROUNDING * self.zoom,
                    Stroke::new(2.0, Color32::from_rgb(100, 150, 255)),
                );
            }

            for port in node.ports() {
                let pos = self.graph_to_screen(port_center(node, port), rect);
                self.draw_port(painter, port, pos, mouse_pos);
            }

            let body = Rect::from_min_max(
                Pos2::new(screen_rect.left() + 8.0 * self.zoom, screen_rect.bottom() - NODE_BODY_HEIGHT * self.zoom),
                Pos2::new(screen_rect.right() - 8.0 * self.zoom, screen_rect.bottom() - 4.0 * self.zoom),
            );
            self.node_controls(ui, node, pipeline, &status, body, actions, requests);
        }
    }

    fn node_controls(
        &mut self,
        ui: &mut egui::Ui,
        node: &Node,
        pipeline: &Pipeline,
        status: &NodeStatus,
        body: Rect,
        actions: &mut Vec<NodeAction>,
        requests: &mut Vec<EditorRequest>,
    ) {
        let half = body.height() / 2.0;
        let top = Rect::from_min_size(body.min, Vec2::new(body.width(), half - 2.0));
        let bottom = Rect::from_min_size(
            Pos2::new(body.left(), body.top() + half),
            Vec2::new(body.width(), half),
        );

        if matches!(node.kind.default_config(), NodeConfig::Prompt(_)) {
            let text = self
                .prompts
                .entry(node.id)
                .or_insert_with(|| node.config.prompt().unwrap_or_default().to_string());
            let edit = egui::TextEdit::singleline(text)
                .id(egui::Id::new(("prompt", node.id)))
                .hint_text("Prompt");
            if ui.put(top, edit).changed() {
                actions.push(NodeAction::SetPrompt(node.id, text.clone()));
            }
        }

        let label = match (node.kind, status) {
            (_, NodeStatus::Working) => Some("Working..."),
            (NodeKind::ModelLoader, _) => Some("Load model"),
            (NodeKind::SkyboxGenerator, _) => Some("Generate"),
            (NodeKind::SceneRenderer, _) => Some("Render"),
            (NodeKind::AiImageEnhancer, _) => Some("Enhance"),
            (NodeKind::AiEnhancedImage, _) => Some("Re-run"),
            (NodeKind::VideoGenerator, _) => Some("Generate video"),
            (NodeKind::TextPrompt | NodeKind::VideoPlayer, _) => None,
        };

        if node.kind == NodeKind::VideoPlayer {
            let text = pipeline
                .now_playing(node.id)
                .map_or_else(|| "No video".to_string(), |video| video.uri.clone());
            ui.put(body, egui::Label::new(text).truncate());
            return;
        }

        let Some(label) = label else {
            return;
        };
        let clicked = ui.put(bottom, egui::Button::new(label)).clicked();
        if !clicked || *status == NodeStatus::Working {
            return;
        }
        match node.kind {
            NodeKind::ModelLoader => requests.push(EditorRequest::OpenModelFile(node.id)),
            NodeKind::SkyboxGenerator => actions.push(NodeAction::GenerateSkybox(node.id)),
            NodeKind::SceneRenderer => actions.push(NodeAction::Render(node.id)),
            NodeKind::AiImageEnhancer | NodeKind::AiEnhancedImage => {
                actions.push(NodeAction::Enhance(node.id));
            }
            NodeKind::VideoGenerator => actions.push(NodeAction::GenerateVideo(node.id)),
            NodeKind::TextPrompt | NodeKind::VideoPlayer => {}
        }
    }

    fn draw_port(&self, painter: &egui::Painter, port: &Port, pos: Pos2, mouse_pos: Pos2) {
        let radius = PORT_RADIUS * self.zoom;
        let color = schema_color(port);
        let hovered = pos.distance(mouse_pos) < radius * 1.5;

        painter.circle_filled(pos, if hovered { radius * 1.3 } else { radius }, color);
        painter.circle_stroke(pos, radius, Stroke::new(1.0, Color32::from_gray(30)));

        let (label_pos, align) = match port.direction {
            PortDirection::Input => (Pos2::new(pos.x + PORT_PADDING * self.zoom, pos.y), egui::Align2::LEFT_CENTER),
            PortDirection::Output => (Pos2::new(pos.x - PORT_PADDING * self.zoom, pos.y), egui::Align2::RIGHT_CENTER),
        };
        painter.text(
            label_pos,
            align,
            port.label,
            egui::FontId::proportional(10.0 * self.zoom),
            Color32::from_gray(200),
        );
    }

    fn show_creation_menu(&mut self, ctx: &egui::Context, rect: Rect, pipeline: &mut Pipeline) {
        let Some(menu) = self.protocol.menu().cloned() else {
            return;
        };
        let anchor = self.graph_to_screen(Pos2::new(menu.position[0], menu.position[1]), rect);

        let mut chosen = None;
        let mut dismissed = false;
        egui::Area::new(egui::Id::new("node_creation_menu"))
            .fixed_pos(anchor)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    match &menu.origin {
                        Some(origin) => ui.label(format!("Add node accepting {}", origin.schema)),
                        None => ui.label("Add node"),
                    };
                    ui.separator();
                    if menu.entries.is_empty() {
                        ui.label("No compatible nodes");
                    }
                    for kind in &menu.entries {
                        if ui.button(kind.display_name()).clicked() {
                            chosen = Some(*kind);
                        }
                    }
                    ui.separator();
                    if ui.button("Cancel").clicked() {
                        dismissed = true;
                    }
                });
            });

        if let Some(kind) = chosen {
            let outcome = self.protocol.select_menu_entry(pipeline.graph_mut(), kind);
            self.record(outcome);
            pipeline.pump();
        } else if dismissed {
            let outcome = self.protocol.dismiss_menu(pipeline.graph_mut());
            self.record(outcome);
        }
    }

    fn draw_status_bar(&self, ui: &egui::Ui, rect: Rect, graph: &Graph) {
        let status_rect = Rect::from_min_size(
            Pos2::new(rect.left() + 5.0, rect.bottom() - 20.0),
            Vec2::new(rect.width() - 10.0, 18.0),
        );

        ui.painter().text(
            status_rect.left_center(),
            egui::Align2::LEFT_CENTER,
            format!(
                "Nodes: {} | Connections: {} | Zoom: {:.0}% | Selected: {}",
                graph.node_count(),
                graph.connection_count(),
                self.zoom * 100.0,
                self.selected_nodes.len(),
            ),
            egui::FontId::proportional(11.0),
            Color32::from_gray(150),
        );
    }
}

impl Default for GraphEditorState {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_action(pipeline: &mut Pipeline, action: NodeAction) -> Result<(), PipelineError> {
    match action {
        NodeAction::SetPrompt(node, text) => pipeline.set_prompt(node, text)?,
        NodeAction::GenerateSkybox(node) => {
            pipeline.generate_skybox(node)?;
        }
        NodeAction::Render(node) => {
            pipeline.render(node)?;
        }
        NodeAction::Enhance(node) => {
            pipeline.enhance(node)?;
        }
        NodeAction::GenerateVideo(node) => {
            pipeline.generate_video(node)?;
        }
    }
    Ok(())
}

/// Bounds of a node in graph space
pub fn node_rect(node: &Node) -> Rect {
    let rows = node.inputs().len().max(node.outputs().len());
    let height = NODE_HEADER_HEIGHT + rows as f32 * PORT_HEIGHT + NODE_BODY_HEIGHT;
    Rect::from_min_size(
        Pos2::new(node.position[0], node.position[1]),
        Vec2::new(NODE_WIDTH, height),
    )
}

/// Center of a port in graph space
pub fn port_center(node: &Node, port: &Port) -> Pos2 {
    let (ports, x) = match port.direction {
        PortDirection::Input => (node.inputs(), node.position[0]),
        PortDirection::Output => (node.outputs(), node.position[0] + NODE_WIDTH),
    };
    let row = ports.iter().position(|p| p.id == port.id).unwrap_or(0);
    let y = node.position[1] + NODE_HEADER_HEIGHT + row as f32 * PORT_HEIGHT + PORT_HEIGHT / 2.0;
    Pos2::new(x, y)
}

/// Port under a graph-space position
pub fn port_at(graph: &Graph, pos: Pos2) -> Option<Endpoint> {
    let hit_radius = PORT_RADIUS * 1.5;
    graph.nodes().find_map(|node| {
        node.ports()
            .find(|port| port_center(node, port).distance(pos) <= hit_radius)
            .map(|port| Endpoint::new(node.id, port.id.clone()))
    })
}

/// Topmost node under a graph-space position
pub fn node_at(graph: &Graph, pos: Pos2) -> Option<NodeId> {
    let nodes: Vec<&Node> = graph.nodes().collect();
    nodes
        .into_iter()
        .rev()
        .find(|node| node_rect(node).contains(pos))
        .map(|node| node.id)
}

/// Connection whose midpoint handle is under a graph-space position
pub fn connection_at(graph: &Graph, pos: Pos2) -> Option<ConnectionId> {
    graph.connections().find_map(|connection| {
        let from = graph.node(connection.from_node)?;
        let to = graph.node(connection.to_node)?;
        let a = port_center(from, from.port(&connection.from_port)?);
        let b = port_center(to, to.port(&connection.to_port)?);
        (a.lerp(b, 0.5).distance(pos) <= HANDLE_RADIUS * 1.5).then_some(connection.id)
    })
}

/// Classify a release position for [`ConnectionProtocol::release`]
pub fn drop_target(graph: &Graph, pos: Pos2) -> DropTarget {
    if let Some(endpoint) = port_at(graph, pos) {
        DropTarget::Port(endpoint)
    } else if let Some(node) = node_at(graph, pos) {
        DropTarget::Node(node)
    } else {
        DropTarget::Canvas([pos.x, pos.y])
    }
}

fn schema_color(port: &Port) -> Color32 {
    let [r, g, b] = port.schema.color();
    Color32::from_rgb(r, g, b)
}

fn category_color(category: NodeCategory) -> Color32 {
    match category {
        NodeCategory::Input => Color32::from_rgb(70, 110, 80),
        NodeCategory::Scene => Color32::from_rgb(70, 100, 130),
        NodeCategory::Ai => Color32::from_rgb(110, 80, 140),
        NodeCategory::Output => Color32::from_rgb(130, 90, 60),
    }
}

fn status_color(status: &NodeStatus) -> Color32 {
    match status {
        NodeStatus::Idle => Color32::from_gray(120),
        NodeStatus::Working => Color32::from_rgb(230, 180, 60),
        NodeStatus::Ready => Color32::from_rgb(90, 200, 110),
        NodeStatus::Failed(_) => Color32::from_rgb(220, 80, 80),
    }
}

/// Generate points along a cubic bezier curve
fn bezier_points(p0: Pos2, p1: Pos2, p2: Pos2, p3: Pos2, segments: usize) -> Vec<Pos2> {
    (0..=segments)
        .map(|i| {
            let t = i as f32 / segments as f32;
            let mt = 1.0 - t;
            let x = mt * mt * mt * p0.x + 3.0 * mt * mt * t * p1.x + 3.0 * mt * t * t * p2.x + t * t * t * p3.x;
            let y = mt * mt * mt * p0.y + 3.0 * mt * mt * t * p1.y + 3.0 * mt * t * t * p2.y + t * t * t * p3.y;
            Pos2::new(x, y)
        })
        .collect()
}
