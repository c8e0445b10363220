// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and connections.

use crate::connection::{Connection, ConnectionId, Endpoint};
use crate::node::{Node, NodeId, NodeKind};
use crate::port::{PortDirection, PortId, Schema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// A node graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Connections between nodes
    connections: IndexMap<ConnectionId, Connection>,
    /// Last node ID handed out
    last_node_id: u64,
    /// Last connection ID handed out
    last_connection_id: u64,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            last_node_id: 0,
            last_connection_id: 0,
        }
    }

    /// Create the graph a new editor session starts with: a single model loader
    pub fn with_default_node(name: impl Into<String>) -> Self {
        let mut graph = Self::new(name);
        graph.add_node(NodeKind::ModelLoader, [100.0, 100.0]);
        graph
    }

    /// Add a node of the given kind and return its ID
    pub fn add_node(&mut self, kind: NodeKind, position: [f32; 2]) -> NodeId {
        self.last_node_id += 1;
        let id = NodeId(self.last_node_id);
        let node = Node::new(id, kind).with_position(position[0], position[1]);
        self.nodes.insert(id, node);
        tracing::debug!(node = %id, ?kind, "Added node");
        id
    }

    /// Remove a node and its connections
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        // Remove connections involving this node
        self.connections.retain(|_, c| !c.involves_node(node_id));
        // Remove the node
        self.nodes.shift_remove(&node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Schema and direction of a port, validating that both exist
    fn port_info(
        &self,
        node_id: NodeId,
        port_id: &PortId,
    ) -> Result<(Schema, PortDirection), ConnectionError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(ConnectionError::NodeNotFound(node_id))?;
        let port = node
            .port(port_id)
            .ok_or_else(|| ConnectionError::PortNotFound(Endpoint::new(node_id, port_id.clone())))?;
        Ok((port.schema, port.direction))
    }

    /// Check whether a connection from `from` to `to` would be accepted
    pub fn validate_connection(
        &self,
        from_node: NodeId,
        from_port: &PortId,
        to_node: NodeId,
        to_port: &PortId,
    ) -> Result<(), ConnectionError> {
        let (source_schema, source_direction) = self.port_info(from_node, from_port)?;
        let (target_schema, target_direction) = self.port_info(to_node, to_port)?;

        // Source must be an output, target an input, and the schemas identical
        if source_direction != PortDirection::Output
            || target_direction != PortDirection::Input
            || !source_schema.can_connect_to(target_schema)
        {
            return Err(ConnectionError::SchemaMismatch {
                source_schema,
                source_direction,
                target_schema,
                target_direction,
            });
        }

        // Prevent self-loops
        if from_node == to_node {
            return Err(ConnectionError::SelfLoop);
        }

        if self.connections.values().any(|c| {
            c.from_node == from_node
                && c.from_port == *from_port
                && c.to_node == to_node
                && c.to_port == *to_port
        }) {
            return Err(ConnectionError::DuplicateConnection);
        }

        // Inputs take a single connection
        if self
            .connections
            .values()
            .any(|c| c.to_node == to_node && c.to_port == *to_port)
        {
            return Err(ConnectionError::PortAlreadyConnected(Endpoint::new(
                to_node,
                to_port.clone(),
            )));
        }

        if self.is_reachable(to_node, from_node) {
            return Err(ConnectionError::CycleDetected);
        }

        Ok(())
    }

    /// Add a connection between ports
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: PortId,
        to_node: NodeId,
        to_port: PortId,
    ) -> Result<ConnectionId, ConnectionError> {
        if let Err(err) = self.validate_connection(from_node, &from_port, to_node, &to_port) {
            tracing::debug!(
                from = %Endpoint::new(from_node, from_port),
                to = %Endpoint::new(to_node, to_port),
                "Rejected connection: {err}"
            );
            return Err(err);
        }

        self.last_connection_id += 1;
        let id = ConnectionId(self.last_connection_id);
        let connection = Connection::new(id, from_node, from_port, to_node, to_port);
        tracing::debug!(connection = %id, from = %connection.source(), to = %connection.target(), "Connected");
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Re-insert a previously removed connection under its original ID.
    ///
    /// The connection is validated again against the current graph.
    pub fn restore_connection(&mut self, connection: Connection) -> Result<ConnectionId, ConnectionError> {
        if self.connections.contains_key(&connection.id) {
            return Err(ConnectionError::DuplicateConnection);
        }
        self.validate_connection(
            connection.from_node,
            &connection.from_port,
            connection.to_node,
            &connection.to_port,
        )?;
        let id = connection.id;
        self.last_connection_id = self.last_connection_id.max(id.0);
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections.shift_remove(&connection_id)
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get connections leaving a specific output port
    pub fn connections_from<'a>(
        &'a self,
        node_id: NodeId,
        port_id: &'a PortId,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .values()
            .filter(move |c| c.from_node == node_id && c.from_port == *port_id)
    }

    /// Get connections arriving at a specific input port
    pub fn connections_to<'a>(
        &'a self,
        node_id: NodeId,
        port_id: &'a PortId,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .values()
            .filter(move |c| c.to_node == node_id && c.to_port == *port_id)
    }

    /// Connections whose target is `node_id`, in insertion order
    pub fn nodes_targeting(&self, node_id: NodeId) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| c.to_node == node_id)
            .collect()
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether `to` can be reached from `from` by following connections downstream
    fn is_reachable(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(node_id) = stack.pop() {
            if node_id == to {
                return true;
            }
            if !seen.insert(node_id) {
                continue;
            }
            stack.extend(
                self.connections
                    .values()
                    .filter(|c| c.from_node == node_id)
                    .map(|c| c.to_node),
            );
        }
        false
    }

    /// Nodes with every producer ahead of its consumers. Independent nodes
    /// keep their insertion order.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut waiting: IndexMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        for connection in self.connections.values() {
            if !self.nodes.contains_key(&connection.from_node) {
                continue;
            }
            if let Some(count) = waiting.get_mut(&connection.to_node) {
                *count += 1;
            }
        }

        let mut ready: VecDeque<NodeId> = waiting
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node_id) = ready.pop_front() {
            order.push(node_id);
            for connection in self.connections.values().filter(|c| c.from_node == node_id) {
                if let Some(count) = waiting.get_mut(&connection.to_node) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(connection.to_node);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let nodes = waiting
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(CycleError { nodes });
        }
        Ok(order)
    }

    /// Serialize the graph as pretty RON
    pub fn to_ron(&self) -> Result<String, GraphFileError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Load a graph from RON, re-validating every connection
    pub fn from_ron(text: &str) -> Result<Self, GraphFileError> {
        let loaded: Graph = ron::from_str(text)?;
        if let Some((key, node)) = loaded.nodes.iter().find(|(key, node)| **key != node.id) {
            return Err(GraphFileError::NodeIdMismatch { key: *key, id: node.id });
        }

        let mut graph = Graph {
            name: loaded.name,
            nodes: loaded.nodes,
            connections: IndexMap::new(),
            last_node_id: loaded.last_node_id,
            last_connection_id: loaded.last_connection_id,
        };
        graph.last_node_id = graph
            .nodes
            .keys()
            .map(|id| id.0)
            .max()
            .unwrap_or(0)
            .max(graph.last_node_id);

        for (_, connection) in loaded.connections {
            let id = connection.id;
            graph
                .restore_connection(connection)
                .map_err(|source| GraphFileError::InvalidConnection { id, source })?;
        }

        let order = graph.topological_order()?;
        tracing::debug!(name = %graph.name, nodes = order.len(), "Graph loaded");
        Ok(graph)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error when creating a connection
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(Endpoint),

    /// Ports differ in schema, or are not an output/input pair
    #[error(
        "Schema mismatch: {source_schema} {source_direction:?} cannot feed {target_schema} {target_direction:?}"
    )]
    SchemaMismatch {
        /// Schema of the source port
        source_schema: Schema,
        /// Direction of the source port
        source_direction: PortDirection,
        /// Schema of the target port
        target_schema: Schema,
        /// Direction of the target port
        target_direction: PortDirection,
    },

    /// Input port already has a connection
    #[error("Port already connected: {0}")]
    PortAlreadyConnected(Endpoint),

    /// The exact same link already exists
    #[error("Connection already exists")]
    DuplicateConnection,

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// Connection would close a cycle
    #[error("Connection would create a cycle")]
    CycleDetected,
}

/// The graph has no producer-first order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Graph contains a cycle through nodes {nodes:?}")]
pub struct CycleError {
    /// Nodes left waiting on a producer in the cycle
    pub nodes: Vec<NodeId>,
}

/// Error reading or writing a saved graph
#[derive(Debug, thiserror::Error)]
pub enum GraphFileError {
    /// RON serialization failed
    #[error("Failed to serialize graph: {0}")]
    Serialize(#[from] ron::Error),

    /// RON parsing failed
    #[error("Failed to parse graph: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// A saved connection breaks the graph invariants
    #[error("Invalid connection {id}: {source}")]
    InvalidConnection {
        /// Saved connection ID
        id: ConnectionId,
        /// Why it was rejected
        source: ConnectionError,
    },

    /// A node is stored under a key other than its own ID
    #[error("Node {id} stored under key {key}")]
    NodeIdMismatch {
        /// Map key in the file
        key: NodeId,
        /// ID inside the node
        id: NodeId,
    },

    /// Connections form a cycle
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ports;

    fn pipeline_graph() -> (Graph, NodeId, NodeId) {
        let mut graph = Graph::with_default_node("Test");
        let loader = NodeId(1);
        let renderer = graph.add_node(NodeKind::SceneRenderer, [300.0, 100.0]);
        (graph, loader, renderer)
    }

    #[test]
    fn test_default_node_is_model_loader_one() {
        let graph = Graph::with_default_node("Test");
        let node = graph.node(NodeId(1)).unwrap();
        assert_eq!(node.kind, NodeKind::ModelLoader);
        assert_eq!(node.id.to_string(), "1");
    }

    #[test]
    fn test_ids_are_unique_and_monotonic() {
        let mut graph = Graph::new("Test");
        let ids: Vec<_> = (0..5)
            .map(|_| graph.add_node(NodeKind::TextPrompt, [0.0, 0.0]))
            .collect();
        assert!(ids.windows(2).all(|w| w[0].0 < w[1].0));

        graph.remove_node(ids[4]);
        let next = graph.add_node(NodeKind::TextPrompt, [0.0, 0.0]);
        assert!(!ids.contains(&next));
    }

    #[test]
    fn test_connect_matching_schema() {
        let (mut graph, loader, renderer) = pipeline_graph();
        let id = graph
            .connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)
            .unwrap();
        assert_eq!(graph.connection_count(), 1);
        assert_eq!(graph.nodes_targeting(renderer)[0].id, id);
    }

    #[test]
    fn test_every_matching_pair_connects_and_mismatches_fail() {
        for source_kind in NodeKind::ALL {
            for target_kind in NodeKind::ALL {
                for out in source_kind.outputs() {
                    for input in target_kind.inputs() {
                        let mut graph = Graph::new("Matrix");
                        let a = graph.add_node(source_kind, [0.0, 0.0]);
                        let b = graph.add_node(target_kind, [0.0, 0.0]);
                        let result = graph.connect(a, out.id.clone(), b, input.id.clone());
                        if out.schema == input.schema {
                            assert!(result.is_ok(), "{source_kind:?} -> {target_kind:?}");
                        } else {
                            assert!(matches!(result, Err(ConnectionError::SchemaMismatch { .. })));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_same_direction_rejected_as_schema_mismatch() {
        let mut graph = Graph::new("Test");
        let a = graph.add_node(NodeKind::AiEnhancedImage, [0.0, 0.0]);
        let b = graph.add_node(NodeKind::AiImageEnhancer, [0.0, 0.0]);

        let inputs = graph.connect(a, ports::RENDERED_IMAGE_INPUT, b, ports::RENDERED_IMAGE_INPUT);
        assert!(matches!(inputs, Err(ConnectionError::SchemaMismatch { .. })));

        let outputs = graph.connect(a, ports::ENHANCED_IMAGE_OUTPUT, b, ports::ENHANCED_IMAGE_OUTPUT);
        assert!(matches!(outputs, Err(ConnectionError::SchemaMismatch { .. })));
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_video_to_text_rejected() {
        let mut graph = Graph::new("Test");
        let video = graph.add_node(NodeKind::VideoGenerator, [0.0, 0.0]);
        let skybox = graph.add_node(NodeKind::SkyboxGenerator, [0.0, 0.0]);

        let result = graph.connect(video, ports::VIDEO_OUTPUT, skybox, ports::PROMPT_INPUT);
        assert_eq!(
            result,
            Err(ConnectionError::SchemaMismatch {
                source_schema: Schema::GeneratedVideo,
                source_direction: PortDirection::Output,
                target_schema: Schema::Text,
                target_direction: PortDirection::Input,
            })
        );
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_input_accepts_single_connection() {
        let (mut graph, loader, renderer) = pipeline_graph();
        let second_loader = graph.add_node(NodeKind::ModelLoader, [0.0, 300.0]);

        graph
            .connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)
            .unwrap();
        let result = graph.connect(second_loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT);
        assert!(matches!(result, Err(ConnectionError::PortAlreadyConnected(_))));
    }

    #[test]
    fn test_outputs_fan_out() {
        let mut graph = Graph::new("Test");
        let renderer = graph.add_node(NodeKind::SceneRenderer, [0.0, 0.0]);
        let a = graph.add_node(NodeKind::AiEnhancedImage, [0.0, 0.0]);
        let b = graph.add_node(NodeKind::AiImageEnhancer, [0.0, 0.0]);

        graph
            .connect(renderer, ports::RENDERED_IMAGE_OUTPUT, a, ports::RENDERED_IMAGE_INPUT)
            .unwrap();
        graph
            .connect(renderer, ports::RENDERED_IMAGE_OUTPUT, b, ports::RENDERED_IMAGE_INPUT)
            .unwrap();
        assert_eq!(
            graph
                .connections_from(renderer, &ports::RENDERED_IMAGE_OUTPUT)
                .count(),
            2
        );
    }

    #[test]
    fn test_remove_node_drops_its_connections() {
        let (mut graph, loader, renderer) = pipeline_graph();
        graph
            .connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)
            .unwrap();

        graph.remove_node(loader);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.nodes_targeting(renderer).is_empty());
    }

    #[test]
    fn test_topological_order_puts_producers_first() {
        let (mut graph, loader, renderer) = pipeline_graph();
        let enhancer = graph.add_node(NodeKind::AiEnhancedImage, [0.0, 0.0]);
        graph
            .connect(renderer, ports::RENDERED_IMAGE_OUTPUT, enhancer, ports::RENDERED_IMAGE_INPUT)
            .unwrap();
        graph
            .connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)
            .unwrap();

        let order = graph.topological_order().unwrap();
        let pos = |id| order.iter().position(|n| *n == id).unwrap();
        assert!(pos(loader) < pos(renderer));
        assert!(pos(renderer) < pos(enhancer));
    }

    #[test]
    fn test_restore_keeps_original_id() {
        let (mut graph, loader, renderer) = pipeline_graph();
        let id = graph
            .connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)
            .unwrap();
        let removed = graph.disconnect(id).unwrap();
        assert_eq!(graph.restore_connection(removed.clone()), Ok(id));
        assert_eq!(graph.connection(id), Some(&removed));
    }

    #[test]
    fn test_ron_roundtrip() {
        let (mut graph, loader, renderer) = pipeline_graph();
        graph
            .connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)
            .unwrap();

        let text = graph.to_ron().unwrap();
        let mut loaded = Graph::from_ron(&text).unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.connection_count(), 1);

        // Counters survive, so new IDs never collide with loaded ones
        let fresh = loaded.add_node(NodeKind::VideoPlayer, [0.0, 0.0]);
        assert_eq!(fresh, NodeId(3));
    }

    #[test]
    fn test_ron_with_invalid_connection_rejected() {
        let (mut graph, loader, renderer) = pipeline_graph();
        graph
            .connect(loader, ports::MODEL_OUTPUT, renderer, ports::MODEL_INPUT)
            .unwrap();
        let text = graph.to_ron().unwrap().replace("\"model-input\"", "\"skybox-input\"");

        let result = Graph::from_ron(&text);
        assert!(matches!(result, Err(GraphFileError::InvalidConnection { .. })));
    }

    #[test]
    fn test_topological_order_reports_cycle() {
        let (mut graph, loader, renderer) = pipeline_graph();
        // Bypass validation to build a loop
        for (id, from, to) in [(1, loader, renderer), (2, renderer, loader)] {
            let id = ConnectionId(id);
            graph
                .connections
                .insert(id, Connection::new(id, from, ports::MODEL_OUTPUT, to, ports::MODEL_INPUT));
        }
        let other = graph.add_node(NodeKind::VideoPlayer, [0.0, 0.0]);

        let err = graph.topological_order().unwrap_err();
        assert_eq!(err.nodes, vec![loader, renderer]);
        assert!(!err.nodes.contains(&other));
    }

    #[test]
    fn test_ron_with_mismatched_node_key_rejected() {
        let (mut graph, _, _) = pipeline_graph();
        graph
            .nodes
            .insert(NodeId(7), Node::new(NodeId(8), NodeKind::VideoPlayer));
        let text = graph.to_ron().unwrap();

        let result = Graph::from_ron(&text);
        assert!(matches!(
            result,
            Err(GraphFileError::NodeIdMismatch { key: NodeId(7), id: NodeId(8) })
        ));
    }
}
