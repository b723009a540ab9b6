//! Document table
//!
//! The [`DocumentManager`] maps document ids to live [`ServerDocument`]
//! actors, creating or restoring them on first access with a double-checked
//! create (lock-free fast path, creation mutex for the slow path, re-check
//! under the lock). Idle documents with no subscribers are persisted and
//! evicted; the next access rehydrates them from storage.

use crate::core::config::DocumentConfig;
use crate::schema::Primitive;
use crate::server::document::ServerDocument;
use crate::storage::{DocumentStore, WriteAheadLog};
use crate::system::metrics::Metrics;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Concurrent id -> document table with injected capabilities
pub struct DocumentManager {
    docs: DashMap<String, Arc<ServerDocument>>,
    create_lock: Mutex<()>,
    schema: Arc<Primitive>,
    store: Option<Arc<dyn DocumentStore>>,
    wal: Option<Arc<dyn WriteAheadLog>>,
    config: DocumentConfig,
}

impl DocumentManager {
    /// Build a manager serving `schema` with the given capabilities
    pub fn new(
        schema: Primitive,
        store: Option<Arc<dyn DocumentStore>>,
        wal: Option<Arc<dyn WriteAheadLog>>,
        config: DocumentConfig,
    ) -> Self {
        Self {
            docs: DashMap::new(),
            create_lock: Mutex::new(()),
            schema: Arc::new(schema),
            store,
            wal,
            config,
        }
    }

    /// Get the live document for `id`, creating or restoring it on demand
    pub async fn document(&self, id: &str) -> Arc<ServerDocument> {
        if let Some(doc) = self.docs.get(id) {
            return doc.clone();
        }

        let _guard = self.create_lock.lock().await;
        if let Some(doc) = self.docs.get(id) {
            return doc.clone();
        }

        let doc = Arc::new(
            ServerDocument::open(
                id,
                self.schema.clone(),
                self.store.clone(),
                self.wal.clone(),
                self.config.clone(),
            )
            .await,
        );
        self.docs.insert(id.to_string(), doc.clone());
        Metrics::global().documents.active.set(self.docs.len() as i64);
        doc
    }

    /// Number of resident documents
    pub fn active_count(&self) -> usize {
        self.docs.len()
    }

    /// Persist every dirty resident document
    pub async fn persist_all(&self) {
        let docs: Vec<Arc<ServerDocument>> =
            self.docs.iter().map(|entry| entry.value().clone()).collect();
        for doc in docs {
            if let Err(err) = doc.persist().await {
                tracing::warn!(document = doc.id(), %err, "periodic snapshot failed");
            }
        }
    }

    /// Evict documents idle longer than `idle_after` with no subscribers,
    /// persisting them first. Returns the number evicted.
    pub async fn evict_idle(&self, idle_after: Duration) -> usize {
        let candidates: Vec<Arc<ServerDocument>> = self
            .docs
            .iter()
            .filter(|entry| {
                entry.value().subscriber_count() == 0 && entry.value().idle_for() > idle_after
            })
            .map(|entry| entry.value().clone())
            .collect();

        let mut evicted = 0;
        for doc in candidates {
            if let Err(err) = doc.persist().await {
                tracing::warn!(document = doc.id(), %err, "skipping eviction, snapshot failed");
                continue;
            }
            // Re-check under the map entry: a subscriber may have arrived
            // while the snapshot was being written.
            let removed = self
                .docs
                .remove_if(doc.id(), |_, d| d.subscriber_count() == 0)
                .is_some();
            if removed {
                evicted += 1;
                Metrics::global().documents.evicted.inc();
                tracing::debug!(document = doc.id(), "evicted idle document");
            }
        }
        Metrics::global().documents.active.set(self.docs.len() as i64);
        evicted
    }
}
