//! HTTP/WebSocket server assembly

use crate::core::app_state::AppState;
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::response::Json;
use axum::Router;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes::{create_api_routes, create_websocket_routes};

/// Creates the main application router with all routes and middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let root_route = Router::new().route("/", axum::routing::get(root_handler));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .merge(root_route)
        .merge(create_api_routes())
        .merge(create_websocket_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Root handler that provides API information
async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Concord",
        "version": crate::VERSION,
        "description": "Real-time collaborative document engine",
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "documents": "/doc/{documentId} (websocket)"
        }
    }))
}

/// Start the server and run until the listener fails
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> crate::core::Result<()> {
    tracing::info!("Starting Concord server on {}", addr);

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Documents at ws://{}/doc/{{documentId}}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
