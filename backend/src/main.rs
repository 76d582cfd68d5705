//! Quran Offline - local service that downloads Quran content for offline use
//! and exposes its progress over HTTP.

use anyhow::Result;
use quran_offline::{config, server, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Starting Quran Offline v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = config::load_or_create_default()?;
    info!("Configuration loaded from {:?}", config::config_path());
    info!("Offline data stored in {:?}", settings.storage.data_dir);

    let state = Arc::new(AppState::open(settings)?);

    // Records left mid-flight by a previous run can never finish on their own
    let recovered = state.downloads.recover_interrupted().await;
    if recovered > 0 {
        info!("Marked {} interrupted downloads as failed", recovered);
    }

    server::run(Arc::clone(&state)).await?;

    state.downloads.index().flush().await;
    info!("Shut down cleanly");

    Ok(())
}
