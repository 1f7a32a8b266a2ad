//! REST API Server for DOCX Mail-Merge
//!
//! - `GET /health`: liveness probe
//! - `POST /api/v1/detect`: list the merge fields of a base64 DOCX
//! - `POST /api/v1/merge`: validate JSON merge data and return the merged DOCX
//!
//! Requests are independent; no state is kept between them.

pub mod config;
mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use config::{ConfigError, ServerConfig};
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone, Debug, Default)]
pub struct ApiState {
    /// Settings fixed at start-up
    pub config: Arc<ServerConfig>,
}

impl ApiState {
    /// Create new API state
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/detect", post(detect_fields))
        .route("/api/v1/merge", post(merge_document))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn start_server(state: ApiState) -> Result<(), std::io::Error> {
    let addr = state.config.bind_addr.clone();
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app).await
}
