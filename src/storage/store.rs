//! Storage capability traits
//!
//! Durable storage is an injected capability behind two narrow traits: a
//! [`DocumentStore`] for cold snapshots and an optional [`WriteAheadLog`]
//! for per-transaction durability between snapshots. Adapters treat the
//! persisted JSON as opaque; migration and encryption hooks wrap a store
//! with [`HookedStore`].

use crate::core::error::StorageError;
use crate::core::operation::Transaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::Arc;

/// Cold snapshot storage for document state
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the latest persisted document, if any
    async fn load(&self, document_id: &str) -> Result<Option<Json>, StorageError>;

    /// Persist the document, replacing any previous snapshot
    async fn save(&self, document_id: &str, state: &Json) -> Result<(), StorageError>;

    /// Remove the persisted document
    async fn delete(&self, document_id: &str) -> Result<(), StorageError>;
}

/// One write-ahead log record: the transaction and the version it produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalEntry {
    /// Version assigned by the accepting server
    pub version: u64,
    /// The applied transaction
    pub transaction: Transaction,
}

/// Hot per-transaction durability between snapshots
#[async_trait]
pub trait WriteAheadLog: Send + Sync {
    /// Append one record; called before the transaction is broadcast
    async fn append(&self, document_id: &str, entry: WalEntry) -> Result<(), StorageError>;

    /// Records with `version >= from_version`, in version order
    async fn entries(&self, document_id: &str, from_version: u64)
        -> Result<Vec<WalEntry>, StorageError>;
}

/// Transform applied to persisted payloads on their way in or out
pub type TransformHook = dyn Fn(Json) -> Result<Json, StorageError> + Send + Sync;

/// A store wrapped with optional `on_load`/`on_save` transforms, for
/// migration or encryption at the storage boundary.
pub struct HookedStore {
    inner: Arc<dyn DocumentStore>,
    on_load: Option<Box<TransformHook>>,
    on_save: Option<Box<TransformHook>>,
}

impl HookedStore {
    /// Wrap a store with no hooks yet
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner, on_load: None, on_save: None }
    }

    /// Transform raw persisted payloads after load
    pub fn on_load(
        mut self,
        hook: impl Fn(Json) -> Result<Json, StorageError> + Send + Sync + 'static,
    ) -> Self {
        self.on_load = Some(Box::new(hook));
        self
    }

    /// Transform payloads before save
    pub fn on_save(
        mut self,
        hook: impl Fn(Json) -> Result<Json, StorageError> + Send + Sync + 'static,
    ) -> Self {
        self.on_save = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl DocumentStore for HookedStore {
    async fn load(&self, document_id: &str) -> Result<Option<Json>, StorageError> {
        match self.inner.load(document_id).await? {
            Some(raw) => match &self.on_load {
                Some(hook) => hook(raw).map(Some),
                None => Ok(Some(raw)),
            },
            None => Ok(None),
        }
    }

    async fn save(&self, document_id: &str, state: &Json) -> Result<(), StorageError> {
        match &self.on_save {
            Some(hook) => {
                let transformed = hook(state.clone())?;
                self.inner.save(document_id, &transformed).await
            }
            None => self.inner.save(document_id, state).await,
        }
    }

    async fn delete(&self, document_id: &str) -> Result<(), StorageError> {
        self.inner.delete(document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem_store::MemStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_hooks_transform_both_ways() {
        let store = HookedStore::new(Arc::new(MemStore::new()))
            .on_save(|mut v| {
                v["wrapped"] = json!(true);
                Ok(v)
            })
            .on_load(|mut v| {
                v.as_object_mut().map(|o| o.remove("wrapped"));
                Ok(v)
            });
        store.save("d", &json!({"a": 1})).await.unwrap();
        let loaded = store.load("d").await.unwrap().unwrap();
        assert_eq!(loaded, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_failing_hook_surfaces_as_transform_error() {
        let store = HookedStore::new(Arc::new(MemStore::new()))
            .on_save(|_| Err(StorageError::Transform("nope".into())));
        assert!(store.save("d", &json!({})).await.is_err());
    }
}
