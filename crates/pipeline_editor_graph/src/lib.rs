// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph data-flow core for the pipeline editor.
//!
//! Nodes exchange typed payloads (3D models, textures, images, video,
//! text) through schema-checked ports. The crate provides:
//! - Schema registry and node catalog
//! - Graph model with connection validation
//! - A publish/subscribe node data store
//! - Recompute gating for consumer nodes
//! - The drag-to-connect protocol
//! - A pipeline runtime that ties these to rendering and AI services
//! - An egui editor widget
//!
//! ## Architecture
//!
//! Producers publish into the [`NodeDataStore`]; consumers subscribe to the
//! producers they have an incoming connection from. Deliveries are queued
//! and handled breadth-first by the [`Pipeline`], which runs each consumer's
//! [`TriggerGate`] before starting a computation.

pub mod connection;
pub mod graph;
pub mod interaction;
pub mod node;
pub mod payload;
pub mod pipeline;
pub mod port;
pub mod services;
pub mod store;
pub mod trigger;
pub mod ui;

#[cfg(test)]
mod testing;

pub use connection::{Connection, ConnectionId, Endpoint};
pub use graph::{ConnectionError, CycleError, Graph, GraphFileError};
pub use interaction::{ConnectionOutcome, ConnectionProtocol, ConnectionState, DropTarget};
pub use node::{ports, Node, NodeConfig, NodeId, NodeKind, NodeRegistry, NodeType};
pub use payload::{ImageData, ModelAsset, ModelFormat, NodeData, PortValue, VideoData};
pub use pipeline::{NodeStatus, Notification, NotificationLevel, Pipeline, PipelineError};
pub use port::{Port, PortDirection, PortId, Schema};
pub use services::{ImportError, ServiceError, Services};
pub use store::{NodeDataEntry, NodeDataStore, SubscriptionHandle};
pub use trigger::{TriggerDecision, TriggerGate};
pub use ui::{EditorRequest, GraphEditorState};
