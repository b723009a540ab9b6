//! In-memory storage adapters
//!
//! The default backend: documents and WAL records live in concurrent maps.
//! Useful for tests and for deployments where durability comes from an
//! external adapter instead.

use crate::core::error::StorageError;
use crate::storage::store::{DocumentStore, WalEntry, WriteAheadLog};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as Json;

/// In-memory snapshot store
#[derive(Default)]
pub struct MemStore {
    documents: DashMap<String, Json>,
}

impl MemStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemStore {
    async fn load(&self, document_id: &str) -> Result<Option<Json>, StorageError> {
        Ok(self.documents.get(document_id).map(|v| v.clone()))
    }

    async fn save(&self, document_id: &str, state: &Json) -> Result<(), StorageError> {
        self.documents.insert(document_id.to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<(), StorageError> {
        self.documents.remove(document_id);
        Ok(())
    }
}

/// In-memory write-ahead log
#[derive(Default)]
pub struct MemWal {
    logs: DashMap<String, Vec<WalEntry>>,
}

impl MemWal {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WriteAheadLog for MemWal {
    async fn append(&self, document_id: &str, entry: WalEntry) -> Result<(), StorageError> {
        self.logs.entry(document_id.to_string()).or_default().push(entry);
        Ok(())
    }

    async fn entries(
        &self,
        document_id: &str,
        from_version: u64,
    ) -> Result<Vec<WalEntry>, StorageError> {
        let mut entries: Vec<WalEntry> = self
            .logs
            .get(document_id)
            .map(|log| {
                log.iter()
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|e| e.version);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::Transaction;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = MemStore::new();
        assert!(store.load("d").await.unwrap().is_none());
        store.save("d", &json!({"v": 1})).await.unwrap();
        assert_eq!(store.load("d").await.unwrap(), Some(json!({"v": 1})));
        store.delete("d").await.unwrap();
        assert!(store.load("d").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wal_filters_and_orders_by_version() {
        let wal = MemWal::new();
        for version in [2u64, 1, 3] {
            wal.append(
                "d",
                WalEntry { version, transaction: Transaction::new(vec![]) },
            )
            .await
            .unwrap();
        }
        let entries = wal.entries("d", 2).await.unwrap();
        let versions: Vec<u64> = entries.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![2, 3]);
        assert!(wal.entries("other", 0).await.unwrap().is_empty());
    }
}
