//! HTTP/WebSocket API surface
//!
//! A thin axum layer over the engine: health and metrics endpoints plus
//! the `/doc/{documentId}` websocket route that hands connections to the
//! protocol handler. Framing and transport details stop here.

/// Route table
pub mod routes;
/// HTTP and websocket handlers
pub mod handlers;
/// Server assembly and startup
pub mod server;

pub use server::{create_app, start_server};
