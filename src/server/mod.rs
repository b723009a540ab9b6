//! Server-side document engine
//!
//! Per-document authoritative actors ([`ServerDocument`]) behind a
//! concurrent table ([`DocumentManager`]), the ephemeral presence channel
//! ([`PresenceManager`]) and the per-connection protocol handler.

/// Per-document authoritative actor
pub mod document;
/// Document table
pub mod manager;
/// Ephemeral presence channel
pub mod presence;
/// Per-connection protocol handler
pub mod connection;

pub use connection::{run_connection, ConnectionContext};
pub use document::ServerDocument;
pub use manager::DocumentManager;
pub use presence::{PresenceEvent, PresenceManager};
