//! Wire protocol
//!
//! JSON over a frame-oriented transport; every frame is one object tagged
//! by `"type"`. Client frames drive the per-connection state machine,
//! server frames carry ordered transactions, snapshots and the parallel
//! presence channel. Field names are camelCase on the wire.
//!
//! Frame decode failures are connection-level protocol errors, never
//! per-transaction rejections.

use crate::auth::Permission;
use crate::core::error::ProtocolError;
use crate::core::operation::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Frames a client may send
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate this connection for the document in the path
    Auth {
        /// Opaque credential passed to the auth capability
        token: String,
    },
    /// Liveness probe; the server answers with `pong`
    Ping,
    /// Submit a transaction for ordering and broadcast
    Submit {
        /// The encoded transaction
        transaction: Transaction,
    },
    /// Ask for the current state and version
    RequestSnapshot,
    /// Upsert this connection's presence payload
    PresenceSet {
        /// Opaque presence payload (cursor position, display name, ...)
        data: Json,
    },
    /// Remove this connection's presence entry
    PresenceClear,
}

/// Frames the server may send
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Outcome of an `auth` frame; the connection stays open either way
    #[serde(rename_all = "camelCase")]
    AuthResult {
        /// Whether authentication succeeded
        success: bool,
        /// Authenticated user id, on success
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Granted permission, on success
        #[serde(skip_serializing_if = "Option::is_none")]
        permission: Option<Permission>,
        /// Failure description, on failure
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Liveness answer
    Pong,
    /// An ordered transaction broadcast to every subscriber
    Transaction {
        /// The applied transaction
        transaction: Transaction,
        /// The version it produced
        version: u64,
    },
    /// Current state and version
    Snapshot {
        /// State as JSON (null when the document is undefined)
        state: Json,
        /// Version counting applied transactions
        version: u64,
    },
    /// A per-transaction or per-connection rejection
    #[serde(rename_all = "camelCase")]
    Error {
        /// The rejected transaction id, when the error is transactional
        #[serde(skip_serializing_if = "Option::is_none")]
        transaction_id: Option<String>,
        /// Human-readable reason
        reason: String,
    },
    /// Presence map at subscribe time, excluding the receiver itself
    #[serde(rename_all = "camelCase")]
    PresenceSnapshot {
        /// The receiver's own connection id
        self_id: String,
        /// Connection id -> presence entry
        presences: BTreeMap<String, PresenceEntry>,
    },
    /// Another connection set or updated its presence
    #[serde(rename_all = "camelCase")]
    PresenceUpdate {
        /// The originating connection id
        id: String,
        /// The presence payload
        data: Json,
        /// The originating user id, when authenticated
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Another connection's presence entry went away
    PresenceRemove {
        /// The originating connection id
        id: String,
    },
}

/// One connection's ephemeral presence payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// Opaque presence payload
    pub data: Json,
    /// Owning user id, when authenticated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ClientMessage {
    /// Decode one frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }

    /// Encode one frame
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("client frames serialize infallibly")
    }
}

impl ServerMessage {
    /// Decode one frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }

    /// Encode one frame
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("server frames serialize infallibly")
    }
}
