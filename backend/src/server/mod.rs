//! Web server module

mod routes;
mod websocket;

use crate::AppState;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_routes())
        .route("/ws", axum::routing::get(websocket::ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Run the web server until Ctrl+C
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let settings = state.settings.read().clone();
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let app = router(state);

    info!("Starting web server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
