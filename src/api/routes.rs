//! Route table

use crate::core::app_state::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use super::handlers::{health_handler, metrics_handler, websocket_handler};

/// Create the HTTP API routes
pub fn create_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
}

/// Create the websocket routes.
///
/// A single wildcard matches every `/doc/{documentId}` path, including
/// nested prefixes like `/team/acme/doc/board-1`.
pub fn create_websocket_routes() -> Router<Arc<AppState>> {
    Router::new().route("/*path", get(websocket_handler))
}
