mod config;
mod library;
mod web;

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::library::Library;
use crate::web::server::run_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Logging initialized, starting the application");

    let config = Config::from_env()?;
    let root = config
        .video_dir
        .canonicalize()
        .with_context(|| format!("video directory {} is not accessible", config.video_dir.display()))?;
    info!("Serving videos from {} with {:?}", root.display(), config.policy);

    let library = actix_web::web::Data::new(Library::new(root, &config.ffprobe_bin, config.policy));

    // Create shutdown signal
    let shutdown = Arc::new(Notify::new());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Ctrl+C received, shutting down");
        signal.notify_waiters();
    });

    if let Err(e) = run_server(&config, library, shutdown).await {
        error!("Web server error: {:?}", e);
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
