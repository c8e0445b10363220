// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drag-to-connect protocol.
//!
//! Pressing on a port starts a drag. Connections already attached to an
//! input origin (or the connection picked up by a redrag) are detached
//! provisionally and held aside. Releasing the pointer then either
//! - connects to the port under the pointer and discards the held
//!   connections,
//! - opens a creation menu filtered to node types that can take the other
//!   end of the connection, or
//! - puts the held connections back, so a drag that made nothing is a no-op.

use crate::connection::{Connection, ConnectionId, Endpoint};
use crate::graph::{ConnectionError, Graph};
use crate::node::{NodeId, NodeKind, NodeRegistry};
use crate::port::{PortDirection, PortId, Schema};

/// Port a drag started from
#[derive(Debug, Clone, PartialEq)]
pub struct DragOrigin {
    /// Node owning the port
    pub node: NodeId,
    /// Port ID
    pub port: PortId,
    /// Port direction
    pub direction: PortDirection,
    /// Port schema
    pub schema: Schema,
}

impl DragOrigin {
    /// The origin as an endpoint
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.node, self.port.clone())
    }
}

/// In-progress connection drag
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDrag {
    /// Where the drag started
    pub origin: DragOrigin,
    /// Current pointer position (graph space)
    pub current_pos: [f32; 2],
}

/// Node creation menu, optionally tied to the drag that opened it
#[derive(Debug, Clone, PartialEq)]
pub struct CreationMenu {
    /// Drag origin, if the menu was opened by dropping a connection
    pub origin: Option<DragOrigin>,
    /// Where the new node will be placed (graph space)
    pub position: [f32; 2],
    /// Node kinds offered
    pub entries: Vec<NodeKind>,
}

/// Protocol state
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConnectionState {
    /// Nothing in progress
    #[default]
    Idle,
    /// Dragging a connection from a port
    DraggingFromPort(ConnectionDrag),
    /// Creation menu is open
    ContextMenuOpen(CreationMenu),
}

/// What the pointer was released over
#[derive(Debug, Clone, PartialEq)]
pub enum DropTarget {
    /// A port
    Port(Endpoint),
    /// A node body, not a port
    Node(NodeId),
    /// Empty canvas at a graph-space position
    Canvas([f32; 2]),
}

/// Result of feeding an event to the protocol
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionOutcome {
    /// A drag started
    DragStarted {
        /// Connections provisionally detached
        detached: usize,
    },
    /// A new connection was made
    Connected(ConnectionId),
    /// The creation menu opened
    MenuOpened,
    /// A node was created from the menu
    NodeCreated {
        /// The new node
        node: NodeId,
        /// Connection to the drag origin, if any
        connection: Option<ConnectionId>,
    },
    /// Nothing was made; held connections were put back
    Restored {
        /// Connections reinserted
        restored: usize,
    },
    /// The connection was refused; held connections were put back
    Rejected(ConnectionError),
    /// The event does not apply in the current state
    Ignored,
}

/// State machine for creating, redirecting and removing connections by drag
#[derive(Debug, Default)]
pub struct ConnectionProtocol {
    state: ConnectionState,
    /// Provisionally detached connections
    detached: Vec<Connection>,
}

impl ConnectionProtocol {
    /// Create an idle protocol
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Whether nothing is in progress
    pub fn is_idle(&self) -> bool {
        matches!(self.state, ConnectionState::Idle)
    }

    /// Active drag, if any
    pub fn drag(&self) -> Option<&ConnectionDrag> {
        match &self.state {
            ConnectionState::DraggingFromPort(drag) => Some(drag),
            _ => None,
        }
    }

    /// Open creation menu, if any
    pub fn menu(&self) -> Option<&CreationMenu> {
        match &self.state {
            ConnectionState::ContextMenuOpen(menu) => Some(menu),
            _ => None,
        }
    }

    /// Connections currently held aside
    pub fn detached(&self) -> &[Connection] {
        &self.detached
    }

    /// Pointer pressed on a port.
    ///
    /// An input origin has its existing connection detached so the drag can
    /// redirect it. Outputs fan out, so their connections stay in place.
    pub fn begin_drag(&mut self, graph: &mut Graph, node: NodeId, port: PortId) -> ConnectionOutcome {
        self.abort(graph);

        let Some(info) = graph.node(node).and_then(|n| n.port(&port)) else {
            return ConnectionOutcome::Ignored;
        };
        let origin = DragOrigin {
            node,
            port,
            direction: info.direction,
            schema: info.schema,
        };

        if origin.direction == PortDirection::Input {
            let attached: Vec<ConnectionId> = graph
                .connections_to(node, &origin.port)
                .map(|c| c.id)
                .collect();
            self.detach(graph, &attached);
        }

        self.start(origin, graph)
    }

    /// Pointer pressed on an existing connection's target end.
    ///
    /// The connection is detached and the drag continues from its source
    /// output, so dropping elsewhere moves the connection.
    pub fn begin_redrag(&mut self, graph: &mut Graph, connection_id: ConnectionId) -> ConnectionOutcome {
        self.abort(graph);

        let Some(connection) = graph.connection(connection_id) else {
            return ConnectionOutcome::Ignored;
        };
        let (node, port) = (connection.from_node, connection.from_port.clone());
        let Some(info) = graph.node(node).and_then(|n| n.port(&port)) else {
            return ConnectionOutcome::Ignored;
        };
        let origin = DragOrigin {
            node,
            port,
            direction: info.direction,
            schema: info.schema,
        };

        self.detach(graph, &[connection_id]);
        self.start(origin, graph)
    }

    fn start(&mut self, origin: DragOrigin, graph: &Graph) -> ConnectionOutcome {
        let current_pos = graph.node(origin.node).map_or([0.0, 0.0], |n| n.position);
        tracing::debug!(
            origin = %origin.endpoint(),
            detached = self.detached.len(),
            "Connection drag started"
        );
        self.state = ConnectionState::DraggingFromPort(ConnectionDrag { origin, current_pos });
        ConnectionOutcome::DragStarted {
            detached: self.detached.len(),
        }
    }

    fn detach(&mut self, graph: &mut Graph, ids: &[ConnectionId]) {
        for id in ids {
            if let Some(connection) = graph.disconnect(*id) {
                self.detached.push(connection);
            }
        }
    }

    /// Pointer moved while dragging
    pub fn update_pointer(&mut self, pos: [f32; 2]) {
        if let ConnectionState::DraggingFromPort(drag) = &mut self.state {
            drag.current_pos = pos;
        }
    }

    /// Pointer released
    pub fn release(
        &mut self,
        graph: &mut Graph,
        registry: &NodeRegistry,
        target: DropTarget,
    ) -> ConnectionOutcome {
        let drag = match std::mem::take(&mut self.state) {
            ConnectionState::DraggingFromPort(drag) => drag,
            other => {
                self.state = other;
                return ConnectionOutcome::Ignored;
            }
        };
        let origin = drag.origin;

        match target {
            DropTarget::Port(endpoint) => self.connect_to_port(graph, &origin, endpoint),
            DropTarget::Canvas(position) => {
                let entries = registry
                    .types_with_port(origin.schema, origin.direction.complement())
                    .map(|t| t.kind)
                    .collect();
                tracing::debug!(origin = %origin.endpoint(), "Opening filtered creation menu");
                self.state = ConnectionState::ContextMenuOpen(CreationMenu {
                    origin: Some(origin),
                    position,
                    entries,
                });
                ConnectionOutcome::MenuOpened
            }
            DropTarget::Node(_) => ConnectionOutcome::Restored {
                restored: self.restore(graph, &origin),
            },
        }
    }

    fn connect_to_port(
        &mut self,
        graph: &mut Graph,
        origin: &DragOrigin,
        endpoint: Endpoint,
    ) -> ConnectionOutcome {
        if endpoint == origin.endpoint() {
            return ConnectionOutcome::Restored {
                restored: self.restore(graph, origin),
            };
        }

        let (from, to) = match origin.direction {
            PortDirection::Output => (origin.endpoint(), endpoint),
            PortDirection::Input => (endpoint, origin.endpoint()),
        };

        // Dropping onto an occupied input takes it over
        if let Err(ConnectionError::PortAlreadyConnected(_)) =
            graph.validate_connection(from.node, &from.port, to.node, &to.port)
        {
            let occupant: Vec<ConnectionId> = graph
                .connections_to(to.node, &to.port)
                .map(|c| c.id)
                .collect();
            self.detach(graph, &occupant);
        }

        match graph.connect(from.node, from.port, to.node, to.port) {
            Ok(id) => {
                self.discard();
                ConnectionOutcome::Connected(id)
            }
            Err(err) => {
                tracing::debug!("Drop refused: {err}");
                self.restore(graph, origin);
                ConnectionOutcome::Rejected(err)
            }
        }
    }

    /// Open the creation menu without a drag (e.g. right click on canvas)
    pub fn open_menu(&mut self, graph: &mut Graph, registry: &NodeRegistry, position: [f32; 2]) {
        self.abort(graph);
        self.state = ConnectionState::ContextMenuOpen(CreationMenu {
            origin: None,
            position,
            entries: registry.types().map(|t| t.kind).collect(),
        });
    }

    /// A node kind was chosen from the creation menu.
    ///
    /// The node is placed at the menu position. If the menu came from a
    /// drag, the new node's complementary port is connected to the origin.
    pub fn select_menu_entry(&mut self, graph: &mut Graph, kind: NodeKind) -> ConnectionOutcome {
        let menu = match std::mem::take(&mut self.state) {
            ConnectionState::ContextMenuOpen(menu) => menu,
            other => {
                self.state = other;
                return ConnectionOutcome::Ignored;
            }
        };
        if !menu.entries.contains(&kind) {
            self.state = ConnectionState::ContextMenuOpen(menu);
            return ConnectionOutcome::Ignored;
        }

        let node = graph.add_node(kind, menu.position);
        let Some(origin) = menu.origin else {
            return ConnectionOutcome::NodeCreated {
                node,
                connection: None,
            };
        };

        let Some(port) = kind.port_with(origin.schema, origin.direction.complement()) else {
            self.restore(graph, &origin);
            return ConnectionOutcome::NodeCreated {
                node,
                connection: None,
            };
        };
        let (from, to) = match origin.direction {
            PortDirection::Output => (origin.endpoint(), Endpoint::new(node, port.id.clone())),
            PortDirection::Input => (Endpoint::new(node, port.id.clone()), origin.endpoint()),
        };

        match graph.connect(from.node, from.port, to.node, to.port) {
            Ok(id) => {
                self.discard();
                ConnectionOutcome::NodeCreated {
                    node,
                    connection: Some(id),
                }
            }
            Err(err) => {
                tracing::warn!("Could not connect new node: {err}");
                self.restore(graph, &origin);
                ConnectionOutcome::NodeCreated {
                    node,
                    connection: None,
                }
            }
        }
    }

    /// The creation menu was closed without a choice
    pub fn dismiss_menu(&mut self, graph: &mut Graph) -> ConnectionOutcome {
        let menu = match std::mem::take(&mut self.state) {
            ConnectionState::ContextMenuOpen(menu) => menu,
            other => {
                self.state = other;
                return ConnectionOutcome::Ignored;
            }
        };
        let restored = match &menu.origin {
            Some(origin) => self.restore(graph, origin),
            None => 0,
        };
        ConnectionOutcome::Restored { restored }
    }

    /// Cancel whatever is in progress, putting held connections back
    pub fn cancel(&mut self, graph: &mut Graph) -> ConnectionOutcome {
        if self.is_idle() {
            return ConnectionOutcome::Ignored;
        }
        ConnectionOutcome::Restored {
            restored: self.abort(graph),
        }
    }

    fn abort(&mut self, graph: &mut Graph) -> usize {
        let origin = match std::mem::take(&mut self.state) {
            ConnectionState::Idle => None,
            ConnectionState::DraggingFromPort(drag) => Some(drag.origin),
            ConnectionState::ContextMenuOpen(menu) => menu.origin,
        };
        match origin {
            Some(origin) => self.restore(graph, &origin),
            None => {
                self.discard();
                0
            }
        }
    }

    fn discard(&mut self) {
        if !self.detached.is_empty() {
            tracing::debug!(count = self.detached.len(), "Dropping detached connections");
        }
        self.detached.clear();
    }

    /// Put held connections back.
    ///
    /// A held connection is skipped when its input has meanwhile received a
    /// new connection, or when one of its nodes is gone.
    fn restore(&mut self, graph: &mut Graph, origin: &DragOrigin) -> usize {
        let mut restored = 0;
        for connection in std::mem::take(&mut self.detached) {
            let origin_taken = origin.direction == PortDirection::Input
                && graph.connections_to(origin.node, &origin.port).next().is_some()
                && connection.to_node == origin.node
                && connection.to_port == origin.port;
            if origin_taken {
                tracing::debug!(connection = %connection.id, "Origin already reconnected, not restoring");
                continue;
            }

            let id = connection.id;
            match graph.restore_connection(connection) {
                Ok(_) => restored += 1,
                Err(err) => tracing::debug!(connection = %id, "Not restoring: {err}"),
            }
        }
        if restored > 0 {
            tracing::debug!(restored, "Restored detached connections");
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ports;

    struct Fixture {
        graph: Graph,
        registry: NodeRegistry,
        protocol: ConnectionProtocol,
        renderer: NodeId,
        enhancer: NodeId,
        edge: ConnectionId,
    }

    fn fixture() -> Fixture {
        let mut graph = Graph::new("Test");
        let renderer = graph.add_node(NodeKind::SceneRenderer, [0.0, 0.0]);
        let enhancer = graph.add_node(NodeKind::AiEnhancedImage, [300.0, 0.0]);
        let edge = graph
            .connect(renderer, ports::RENDERED_IMAGE_OUTPUT, enhancer, ports::RENDERED_IMAGE_INPUT)
            .unwrap();
        Fixture {
            graph,
            registry: NodeRegistry::builtin(),
            protocol: ConnectionProtocol::new(),
            renderer,
            enhancer,
            edge,
        }
    }

    fn edge_set(graph: &Graph) -> Vec<Connection> {
        let mut edges: Vec<_> = graph.connections().cloned().collect();
        edges.sort_by_key(|c| c.id);
        edges
    }

    #[test]
    fn test_drag_from_connected_input_detaches() {
        let mut f = fixture();
        let outcome = f
            .protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);

        assert_eq!(outcome, ConnectionOutcome::DragStarted { detached: 1 });
        assert_eq!(f.graph.connection_count(), 0);
        assert_eq!(f.protocol.detached().len(), 1);
    }

    #[test]
    fn test_drag_from_output_keeps_connections() {
        let mut f = fixture();
        let outcome = f
            .protocol
            .begin_drag(&mut f.graph, f.renderer, ports::RENDERED_IMAGE_OUTPUT);
        assert_eq!(outcome, ConnectionOutcome::DragStarted { detached: 0 });
        assert_eq!(f.graph.connection_count(), 1);
    }

    #[test]
    fn test_canvas_drop_then_dismiss_restores_exactly() {
        let mut f = fixture();
        let before = edge_set(&f.graph);

        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        let outcome = f
            .protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([500.0, 500.0]));
        assert_eq!(outcome, ConnectionOutcome::MenuOpened);
        assert_eq!(f.graph.connection_count(), 0);

        let outcome = f.protocol.dismiss_menu(&mut f.graph);
        assert_eq!(outcome, ConnectionOutcome::Restored { restored: 1 });
        assert_eq!(edge_set(&f.graph), before);
        assert!(f.protocol.is_idle());
    }

    #[test]
    fn test_canvas_drop_from_rendered_output_filters_menu() {
        let mut f = fixture();
        f.protocol
            .begin_drag(&mut f.graph, f.renderer, ports::RENDERED_IMAGE_OUTPUT);
        f.protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([0.0, 200.0]));

        let menu = f.protocol.menu().unwrap();
        assert!(menu.entries.contains(&NodeKind::AiImageEnhancer));
        assert!(menu.entries.contains(&NodeKind::AiEnhancedImage));
        assert!(!menu.entries.contains(&NodeKind::VideoPlayer));
        assert_eq!(menu.entries.len(), 2);
    }

    #[test]
    fn test_canvas_drop_from_input_lists_producers() {
        let mut f = fixture();
        f.protocol
            .begin_drag(&mut f.graph, f.renderer, ports::MODEL_INPUT);
        f.protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([-300.0, 0.0]));

        assert_eq!(f.protocol.menu().unwrap().entries, vec![NodeKind::ModelLoader]);
    }

    #[test]
    fn test_menu_selection_creates_and_connects() {
        let mut f = fixture();
        f.protocol
            .begin_drag(&mut f.graph, f.renderer, ports::RENDERED_IMAGE_OUTPUT);
        f.protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([0.0, 200.0]));

        let ConnectionOutcome::NodeCreated { node, connection } = f
            .protocol
            .select_menu_entry(&mut f.graph, NodeKind::AiImageEnhancer)
        else {
            panic!("expected node creation");
        };

        let created = f.graph.node(node).unwrap();
        assert_eq!(created.kind, NodeKind::AiImageEnhancer);
        assert_eq!(created.position, [0.0, 200.0]);

        let connection = f.graph.connection(connection.unwrap()).unwrap();
        assert_eq!(connection.source(), Endpoint::new(f.renderer, ports::RENDERED_IMAGE_OUTPUT));
        assert_eq!(connection.target(), Endpoint::new(node, ports::RENDERED_IMAGE_INPUT));
        assert_eq!(f.graph.connection_count(), 2);
    }

    #[test]
    fn test_menu_selection_from_input_drops_old_edge() {
        let mut f = fixture();
        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        f.protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([-200.0, 0.0]));

        let ConnectionOutcome::NodeCreated { node, connection } = f
            .protocol
            .select_menu_entry(&mut f.graph, NodeKind::SceneRenderer)
        else {
            panic!("expected node creation");
        };

        assert!(f.graph.connection(f.edge).is_none());
        let connection = f.graph.connection(connection.unwrap()).unwrap();
        assert_eq!(connection.from_node, node);
        assert_eq!(connection.to_node, f.enhancer);
        assert!(f.protocol.detached().is_empty());
    }

    #[test]
    fn test_menu_rejects_unlisted_kind() {
        let mut f = fixture();
        f.protocol
            .begin_drag(&mut f.graph, f.renderer, ports::RENDERED_IMAGE_OUTPUT);
        f.protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([0.0, 0.0]));

        let outcome = f.protocol.select_menu_entry(&mut f.graph, NodeKind::VideoPlayer);
        assert_eq!(outcome, ConnectionOutcome::Ignored);
        assert!(f.protocol.menu().is_some());
        assert_eq!(f.graph.node_count(), 2);
    }

    #[test]
    fn test_drop_on_compatible_port_redirects() {
        let mut f = fixture();
        let other = f.graph.add_node(NodeKind::SceneRenderer, [0.0, 300.0]);

        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        let outcome = f.protocol.release(
            &mut f.graph,
            &f.registry,
            DropTarget::Port(Endpoint::new(other, ports::RENDERED_IMAGE_OUTPUT)),
        );

        let ConnectionOutcome::Connected(id) = outcome else {
            panic!("expected connection, got {outcome:?}");
        };
        assert_eq!(f.graph.connection_count(), 1);
        assert_eq!(f.graph.connection(id).unwrap().from_node, other);
        assert!(f.graph.connection(f.edge).is_none());
    }

    #[test]
    fn test_drop_on_incompatible_port_restores() {
        let mut f = fixture();
        let before = edge_set(&f.graph);
        let player = f.graph.add_node(NodeKind::VideoPlayer, [600.0, 0.0]);

        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        let outcome = f.protocol.release(
            &mut f.graph,
            &f.registry,
            DropTarget::Port(Endpoint::new(player, ports::VIDEO_INPUT)),
        );

        assert!(matches!(
            outcome,
            ConnectionOutcome::Rejected(ConnectionError::SchemaMismatch { .. })
        ));
        assert_eq!(edge_set(&f.graph), before);
    }

    #[test]
    fn test_drop_on_node_body_restores() {
        let mut f = fixture();
        let before = edge_set(&f.graph);

        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        let outcome = f
            .protocol
            .release(&mut f.graph, &f.registry, DropTarget::Node(f.renderer));

        assert_eq!(outcome, ConnectionOutcome::Restored { restored: 1 });
        assert_eq!(edge_set(&f.graph), before);
    }

    #[test]
    fn test_drop_back_on_origin_is_noop() {
        let mut f = fixture();
        let before = edge_set(&f.graph);

        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        f.protocol.release(
            &mut f.graph,
            &f.registry,
            DropTarget::Port(Endpoint::new(f.enhancer, ports::RENDERED_IMAGE_INPUT)),
        );
        assert_eq!(edge_set(&f.graph), before);
    }

    #[test]
    fn test_drop_output_onto_occupied_input_takes_it_over() {
        let mut f = fixture();
        let other = f.graph.add_node(NodeKind::SceneRenderer, [0.0, 300.0]);

        f.protocol
            .begin_drag(&mut f.graph, other, ports::RENDERED_IMAGE_OUTPUT);
        let outcome = f.protocol.release(
            &mut f.graph,
            &f.registry,
            DropTarget::Port(Endpoint::new(f.enhancer, ports::RENDERED_IMAGE_INPUT)),
        );

        assert!(matches!(outcome, ConnectionOutcome::Connected(_)));
        let incoming = f.graph.nodes_targeting(f.enhancer);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_node, other);
    }

    #[test]
    fn test_restore_skips_when_origin_reconnected() {
        let mut f = fixture();
        let other = f.graph.add_node(NodeKind::SceneRenderer, [0.0, 300.0]);

        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        f.protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([0.0, 0.0]));

        // Something else attaches to the origin while the menu is open
        f.graph
            .connect(other, ports::RENDERED_IMAGE_OUTPUT, f.enhancer, ports::RENDERED_IMAGE_INPUT)
            .unwrap();

        let outcome = f.protocol.dismiss_menu(&mut f.graph);
        assert_eq!(outcome, ConnectionOutcome::Restored { restored: 0 });
        assert_eq!(f.graph.nodes_targeting(f.enhancer).len(), 1);
        assert_eq!(f.graph.nodes_targeting(f.enhancer)[0].from_node, other);
    }

    #[test]
    fn test_unconnected_origin_restore_is_noop() {
        let mut f = fixture();
        let player = f.graph.add_node(NodeKind::VideoPlayer, [0.0, 0.0]);
        f.protocol.begin_drag(&mut f.graph, player, ports::VIDEO_INPUT);
        let outcome = f
            .protocol
            .release(&mut f.graph, &f.registry, DropTarget::Node(player));
        assert_eq!(outcome, ConnectionOutcome::Restored { restored: 0 });
        assert_eq!(f.graph.connection_count(), 1);
    }

    #[test]
    fn test_redrag_moves_connection() {
        let mut f = fixture();
        let other = f.graph.add_node(NodeKind::AiImageEnhancer, [300.0, 300.0]);

        let outcome = f.protocol.begin_redrag(&mut f.graph, f.edge);
        assert_eq!(outcome, ConnectionOutcome::DragStarted { detached: 1 });

        f.protocol.release(
            &mut f.graph,
            &f.registry,
            DropTarget::Port(Endpoint::new(other, ports::RENDERED_IMAGE_INPUT)),
        );
        assert!(f.graph.nodes_targeting(f.enhancer).is_empty());
        assert_eq!(f.graph.nodes_targeting(other).len(), 1);
    }

    #[test]
    fn test_starting_new_drag_restores_previous() {
        let mut f = fixture();
        let before = edge_set(&f.graph);
        f.protocol
            .begin_drag(&mut f.graph, f.enhancer, ports::RENDERED_IMAGE_INPUT);
        f.protocol
            .begin_drag(&mut f.graph, f.renderer, ports::MODEL_INPUT);
        assert_eq!(edge_set(&f.graph), before);
    }

    #[test]
    fn test_plain_menu_creates_unconnected_node() {
        let mut f = fixture();
        f.protocol.open_menu(&mut f.graph, &f.registry, [10.0, 10.0]);
        assert_eq!(f.protocol.menu().unwrap().entries.len(), NodeKind::ALL.len());

        let outcome = f.protocol.select_menu_entry(&mut f.graph, NodeKind::TextPrompt);
        assert!(matches!(
            outcome,
            ConnectionOutcome::NodeCreated { connection: None, .. }
        ));
        assert_eq!(f.graph.node_count(), 3);
    }

    #[test]
    fn test_release_without_drag_ignored() {
        let mut f = fixture();
        let outcome = f
            .protocol
            .release(&mut f.graph, &f.registry, DropTarget::Canvas([0.0, 0.0]));
        assert_eq!(outcome, ConnectionOutcome::Ignored);
        assert_eq!(f.protocol.cancel(&mut f.graph), ConnectionOutcome::Ignored);
    }
}
