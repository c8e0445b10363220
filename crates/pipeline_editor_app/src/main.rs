// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline Editor - headless runner
//!
//! Builds the default node graph (model loader, skybox generator, scene
//! renderer, auto enhancer, video generator and player), loads a model and
//! drives the graph until a video reaches the player.
//!
//! ## Usage
//!
//! ```text
//! pipeline_editor [config.ron]
//! ```
//!
//! Without a config file the runner uses mock AI services and a built-in
//! cube model.

mod config;
mod runner;

use config::AppConfig;
use pipeline_editor_services::ConfigError;
use runner::RunError;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "pipeline_editor_app=debug,pipeline_editor_graph=info,pipeline_editor_services=info";

/// Runner error
#[derive(Debug, Error)]
enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),

    #[error(transparent)]
    Run(#[from] RunError),
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pipeline Editor v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        tracing::error!("Pipeline run failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => AppConfig::load(&path)?,
        None => {
            tracing::info!("No configuration given, using defaults");
            AppConfig::default()
        }
    };
    tracing::debug!("Service configuration:\n{}", config.services.to_ron()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("pipeline-worker")
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    let summary = runtime.block_on(runner::run(&config))?;
    runner::report(&summary);
    Ok(())
}
