//! HTTP API gateway for codeloop.
//!
//! A thin collaborator over the orchestrator and the virtual file store:
//!
//! - `POST /api/chat`: run one message through the agent loop
//! - `GET /api/health`: which backends are configured
//! - `GET /api/files`, `GET|DELETE /api/files/{*path}`: browse the store
//!
//! Built on Axum.

pub mod api;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use codeloop_agent::Orchestrator;
use codeloop_files::VirtualFileStore;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub files: Arc<VirtualFileStore>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(orchestrator: Arc<Orchestrator>, files: Arc<VirtualFileStore>) -> SharedState {
        Arc::new(Self { orchestrator, files })
    }
}

/// Build the Axum router with all gateway routes.
///
/// CORS is permissive because the UI is served from a different local port.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/chat", post(api::chat_handler))
        .route("/api/health", get(api::health_handler))
        .route("/api/files", get(api::list_files_handler))
        .route(
            "/api/files/{*path}",
            get(api::get_file_handler).delete(api::delete_file_handler),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: SharedState, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let app = build_router(state);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
