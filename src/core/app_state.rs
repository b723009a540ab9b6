//! Application state
//!
//! Central state holding every service a connection needs: the document
//! manager, the presence manager, the auth capability and configuration.
//! Built once by the factory and shared via `Arc`; no process-wide
//! singletons beyond the metrics registry.

use crate::auth::{build_auth, AuthService};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::schema::Primitive;
use crate::server::{DocumentManager, PresenceManager};
use crate::storage::{build_store, build_wal};
use std::sync::Arc;

/// Shared application state for the server
pub struct AppState {
    /// Document table and submit pipeline
    pub manager: Arc<DocumentManager>,
    /// Ephemeral presence channel
    pub presence: Arc<PresenceManager>,
    /// Authentication capability
    pub auth: Arc<dyn AuthService>,
    /// Engine configuration
    pub config: Arc<Config>,
}

/// Build the application state from configuration and the served schema
pub fn create_app_state(config: Config, schema: Primitive) -> Result<Arc<AppState>> {
    let store = build_store(&config.storage);
    let wal = build_wal(&config.storage);
    let auth = build_auth(&config.auth);
    let manager = Arc::new(DocumentManager::new(
        schema,
        Some(store),
        wal,
        config.document.clone(),
    ));
    let presence = Arc::new(PresenceManager::new(config.presence.broadcast_buffer));

    Ok(Arc::new(AppState {
        manager,
        presence,
        auth,
        config: Arc::new(config),
    }))
}
