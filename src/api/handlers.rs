//! HTTP and websocket handlers

use crate::core::app_state::AppState;
use crate::core::error::ProtocolError;
use crate::server::{run_connection, ConnectionContext};
use crate::system::metrics;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "documents": state.manager.active_count(),
        "version": crate::VERSION,
    }))
}

/// Prometheus metrics in text exposition format
pub async fn metrics_handler() -> String {
    metrics::collect_metrics()
}

/// Websocket endpoint for `/doc/{documentId}`, nested prefixes accepted.
///
/// The last `doc` segment determines the id; the id itself arrives
/// percent-encoded and may contain colons and other printable characters.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let document_id = match parse_document_id(&path) {
        Some(id) => id,
        None => {
            let err = ProtocolError::MissingDocumentId(path);
            tracing::warn!(%err, "rejecting websocket upgrade");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| {
        let ctx = ConnectionContext {
            document_id,
            manager: state.manager.clone(),
            presence: state.presence.clone(),
            auth: state.auth.clone(),
            config: state.config.clone(),
        };
        run_connection(socket, ctx)
    })
}

/// Extract the document id from a connection path: the segment after the
/// last `doc` segment, percent-decoded.
pub fn parse_document_id(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let doc_index = segments.iter().rposition(|s| *s == "doc")?;
    let raw = segments.get(doc_index + 1)?;
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    if decoded.is_empty() {
        None
    } else {
        Some(decoded.into_owned())
    }
}
