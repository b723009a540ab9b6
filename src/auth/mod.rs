//! Authentication capability
//!
//! Authentication is an injected capability: the protocol handler calls
//! [`AuthService::authenticate`] with the connection's token and document
//! id and receives a user id plus a two-level permission. Implementations
//! here are a static table lookup and a disabled mode that grants write;
//! external services plug in behind the same trait.

use crate::core::config::AuthConfig;
use crate::core::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Two-level document permission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Snapshots and broadcasts only
    Read,
    /// Submit transactions and presence updates too
    Write,
}

impl Permission {
    /// Whether this permission allows submitting transactions
    pub fn can_write(&self) -> bool {
        matches!(self, Permission::Write)
    }
}

/// A successful authentication outcome
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthGrant {
    /// The authenticated user
    pub user_id: String,
    /// What the user may do on this document
    pub permission: Permission,
}

/// The injected authentication capability
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Authenticate `token` for `document_id`
    async fn authenticate(&self, token: &str, document_id: &str) -> Result<AuthGrant, AuthError>;
}

/// Grants write access to everyone; the token doubles as the user id
pub struct DisabledAuth;

#[async_trait]
impl AuthService for DisabledAuth {
    async fn authenticate(&self, token: &str, _document_id: &str) -> Result<AuthGrant, AuthError> {
        let user_id = if token.is_empty() {
            "anonymous".to_string()
        } else {
            token.to_string()
        };
        Ok(AuthGrant { user_id, permission: Permission::Write })
    }
}

/// Static token table lookup
pub struct StaticAuth {
    tokens: HashMap<String, AuthGrant>,
}

impl StaticAuth {
    /// Build from explicit grants
    pub fn new(tokens: HashMap<String, AuthGrant>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl AuthService for StaticAuth {
    async fn authenticate(&self, token: &str, _document_id: &str) -> Result<AuthGrant, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Build the configured auth service
pub fn build_auth(config: &AuthConfig) -> Arc<dyn AuthService> {
    match config.mode.as_str() {
        "static" => {
            let tokens = config
                .tokens
                .iter()
                .map(|(token, grant)| {
                    let permission = match grant.permission.as_str() {
                        "read" => Permission::Read,
                        _ => Permission::Write,
                    };
                    (
                        token.clone(),
                        AuthGrant { user_id: grant.user_id.clone(), permission },
                    )
                })
                .collect();
            Arc::new(StaticAuth::new(tokens))
        }
        _ => Arc::new(DisabledAuth),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_auth_grants_write() {
        let grant = DisabledAuth.authenticate("alice", "doc-1").await.unwrap();
        assert_eq!(grant.user_id, "alice");
        assert_eq!(grant.permission, Permission::Write);
        let grant = DisabledAuth.authenticate("", "doc-1").await.unwrap();
        assert_eq!(grant.user_id, "anonymous");
    }

    #[tokio::test]
    async fn test_static_auth_looks_up_tokens() {
        let auth = StaticAuth::new(HashMap::from([(
            "secret".to_string(),
            AuthGrant { user_id: "u1".to_string(), permission: Permission::Read },
        )]));
        let grant = auth.authenticate("secret", "doc-1").await.unwrap();
        assert_eq!(grant.permission, Permission::Read);
        assert!(matches!(
            auth.authenticate("wrong", "doc-1").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
