//! HTTP API server module
//!
//! Exposes the relay over HTTP: an SSE endpoint for observing download
//! progress, static serving of finished artifacts, and a couple of debug and
//! maintenance endpoints.

use crate::Result;
use axum::{Router, routing::get};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// - `GET /yt-dlp/*url` - Start/attach to a download, progress over SSE
/// - `GET /download/*` - Finished artifacts, served from the output directory
/// - `GET /state` - Snapshots of all live jobs (debug)
/// - `GET /clear` - Delete all non-live download directories
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /favicon.ico` - Always 404
/// - anything else - embedded landing page
pub fn create_router(state: AppState) -> Router {
    let artifacts = ServeDir::new(&state.config.download.output_dir);

    Router::new()
        .route("/yt-dlp/*url", get(routes::stream_download))
        .route("/state", get(routes::registry_state))
        .route("/clear", get(routes::clear_downloads))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/favicon.ico", get(routes::favicon))
        .nest_service("/download", artifacts)
        .fallback(routes::index)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server on the configured bind address
///
/// Binds a TCP listener and serves the router until `shutdown` resolves, then
/// finishes in-flight requests and returns.
pub async fn start_api_server(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bind_address = state.config.server.bind_address;
    let app = create_router(state);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServer(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}
