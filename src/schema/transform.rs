//! Operational transformation
//!
//! [`transform_operation`] reconciles a locally-buffered client operation
//! against a concurrent server operation that has already been applied.
//! The rules are driven entirely by operation kinds, paths and payload ids,
//! so transformation never needs document state: containers conceptually
//! shift one token from both paths and delegate, which here is a single
//! walk over the shared path prefix.

use crate::core::operation::{OpKind, Operation};
use serde_json::Value as Json;

/// Outcome of transforming a client op against a server op
#[derive(Clone, Debug, PartialEq)]
pub enum TransformResult {
    /// Apply this (possibly rewritten) operation
    Transformed(Operation),
    /// Drop the client operation
    Noop,
    /// Surface an error to the caller
    Conflict(String),
}

/// Transform `client` against an already-applied `server` operation.
///
/// - Non-overlapping paths: identity.
/// - Same exact path: last write wins, the client op proceeds; except that
///   ops referencing an element/node the server just removed become noops.
/// - Server `*.set` at an ancestor: the client op proceeds optimistically;
///   server re-validation is the authority.
/// - Server remove at an ancestor whose removed id the client path
///   crosses: noop.
/// - Same-target moves: the client wins (last write wins on position).
/// - Different ids in the same array/tree: no conflict.
pub fn transform_operation(client: &Operation, server: &Operation) -> TransformResult {
    if !client.path.overlaps(&server.path) {
        return TransformResult::Transformed(client.clone());
    }

    let client_len = client.path.len();
    let server_len = server.path.len();

    if server_len > client_len {
        // Server acted below the client's target; the client's wholesale
        // write at the ancestor proceeds and supersedes it.
        return TransformResult::Transformed(client.clone());
    }

    if server_len == client_len {
        return transform_same_path(client, server);
    }

    // Server acted at an ancestor of the client path. The only ancestor
    // operations that can invalidate a deeper client op are removals whose
    // id the client path crosses.
    match server.kind {
        OpKind::ArrayRemove | OpKind::TreeRemove => match payload_id(&server.payload) {
            Some(removed) => {
                if client.path.token(server_len) == Some(removed) {
                    TransformResult::Noop
                } else {
                    TransformResult::Transformed(client.clone())
                }
            }
            None => TransformResult::Conflict("remove payload carries no id".to_string()),
        },
        _ => TransformResult::Transformed(client.clone()),
    }
}

/// Both operations target the same container
fn transform_same_path(client: &Operation, server: &Operation) -> TransformResult {
    match server.kind {
        OpKind::ArrayRemove => {
            let Some(removed) = payload_id(&server.payload) else {
                return TransformResult::Conflict("remove payload carries no id".to_string());
            };
            match client.kind {
                OpKind::ArrayRemove | OpKind::ArrayMove
                    if payload_id(&client.payload) == Some(removed) =>
                {
                    TransformResult::Noop
                }
                _ => TransformResult::Transformed(client.clone()),
            }
        }
        OpKind::TreeRemove => {
            let Some(removed) = payload_id(&server.payload) else {
                return TransformResult::Conflict("remove payload carries no id".to_string());
            };
            let orphaned = match client.kind {
                OpKind::TreeRemove => payload_id(&client.payload) == Some(removed),
                OpKind::TreeMove => {
                    payload_id(&client.payload) == Some(removed)
                        || payload_parent(&client.payload) == Some(removed)
                }
                OpKind::TreeInsert => payload_parent(&client.payload) == Some(removed),
                _ => false,
            };
            if orphaned {
                TransformResult::Noop
            } else {
                TransformResult::Transformed(client.clone())
            }
        }
        // Everything else, moves included, is last-write-wins: the client
        // op proceeds unchanged.
        _ => TransformResult::Transformed(client.clone()),
    }
}

fn payload_id(payload: &Json) -> Option<&str> {
    payload.get("id").and_then(Json::as_str)
}

fn payload_parent(payload: &Json) -> Option<&str> {
    payload.get("parentId").and_then(Json::as_str)
}
