//! Serves the trained freshness classifier over HTTP.

mod config;
mod error;
mod handlers;
mod pool;
mod routes;
mod state;

use crate::config::ServeConfig;
use crate::error::ServeError;
use crate::pool::InferencePool;
use crate::state::ServerState;
use burn::config::Config;
use clap::Parser;
use freshness::artifact::load_model;
use freshness::backend::{select_device, InferenceBackend};
use freshness::infer::{BurnClassifier, Pipeline};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tiny_http::Server;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "HTTP endpoint telling fresh from rotten produce")]
struct Args {
    /// Overrides the configured listen address
    #[arg(long)]
    address: Option<String>,

    /// Overrides the configured artifact folder
    #[arg(long)]
    artifact_dir: Option<String>,

    /// JSON server config, defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<(), ServeError> {
    let args = Args::parse();
    SimpleLogger::new().with_level(args.log_level).init()?;

    let mut config = match &args.config {
        Some(path) => ServeConfig::load(path)?,
        None => ServeConfig::new(),
    };
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(artifact_dir) = args.artifact_dir {
        config.artifact_dir = artifact_dir;
    }

    let device = select_device();
    let (model, classes) = load_model::<InferenceBackend>(Path::new(&config.artifact_dir), &device)?;
    info!("Loaded model from {} with {} output classes: {:?}", config.artifact_dir, classes.len(), classes.names());
    info!("Label rule: {:?}, blur threshold {}", config.pipeline.label_rule, config.pipeline.blur_threshold);

    let pipeline = Pipeline::new(BurnClassifier::new(model, device), classes, config.pipeline.clone());
    let pool = InferencePool::new(pipeline, config.inference_threads, config.inference_queue);
    let state = ServerState::new(pool, Duration::from_secs(config.predict_timeout_secs));

    let server = Server::http(&config.address).map_err(|err| ServeError::Bind {
        address: config.address.clone(),
        message: err.to_string(),
    })?;
    info!(
        "Listening on http://{} with {} workers, {} inference threads",
        config.address, config.workers, config.inference_threads
    );

    routes::serve(Arc::new(server), state, config.workers);

    Ok(())
}
