// SPDX-License-Identifier: MIT OR Apache-2.0
//! Service implementations for the pipeline editor.
//!
//! Everything the graph core only knows as a trait lives here:
//! - [`FileModelImporter`] validates and sniffs model files
//! - [`PlaceholderRenderer`] rasterises a scene preview
//! - [`mock`] services produce local placeholder media after a delay
//! - [`remote`] services talk to providers through a [`ProviderTransport`]
//!
//! [`ServiceFactory`] picks mock or provider implementations from an
//! explicit [`ServiceConfig`] and [`SettingsStore`].

pub mod config;
pub mod factory;
pub mod importer;
pub mod mock;
pub mod remote;
pub mod renderer;
pub mod settings;

pub use config::{ConfigError, ServiceConfig};
pub use factory::ServiceFactory;
pub use importer::FileModelImporter;
pub use remote::{ProviderTransport, RemoteServices};
pub use renderer::PlaceholderRenderer;
pub use settings::{SettingsError, SettingsStore};
