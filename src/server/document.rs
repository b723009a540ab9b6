//! Per-document authoritative actor
//!
//! A [`ServerDocument`] owns the persisted state, the monotonic version
//! counter and the subscriber broadcast for one document id. Transactions
//! are validated and applied strictly one at a time under the document's
//! exclusive lock; broadcast order equals apply order.
//!
//! Cancellation safety: `submit` mutates no shared state until after its
//! last await point, so a connection task cancelled mid-submit can never
//! leave the document half-applied.

use crate::core::config::DocumentConfig;
use crate::core::error::{Result, StorageError, TransactionError};
use crate::core::operation::Transaction;
use crate::protocol::ServerMessage;
use crate::schema::{Primitive, Value};
use crate::storage::{DocumentStore, WalEntry, WriteAheadLog};
use crate::system::metrics::{Metrics, Timer};
use serde_json::{json, Value as Json};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};

/// Authoritative server-side state for one document
pub struct ServerDocument {
    id: String,
    schema: Arc<Primitive>,
    inner: RwLock<DocInner>,
    broadcast: broadcast::Sender<ServerMessage>,
    store: Option<Arc<dyn DocumentStore>>,
    wal: Option<Arc<dyn WriteAheadLog>>,
    config: DocumentConfig,
    last_activity: parking_lot::Mutex<Instant>,
    dirty: AtomicBool,
}

struct DocInner {
    state: Option<Value>,
    version: u64,
    seen: SeenSet,
}

/// Bounded set of recently-applied transaction ids, for idempotence
struct SeenSet {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: String) {
        if self.ids.insert(id.clone()) {
            self.order.push_back(id);
            while self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.ids.remove(&evicted);
                }
            }
        }
    }
}

impl ServerDocument {
    /// Open a document: restore from cold storage and replay the WAL when
    /// possible, otherwise initialise from the schema. Load failures fall
    /// back to a fresh document and count a metric.
    pub async fn open(
        id: &str,
        schema: Arc<Primitive>,
        store: Option<Arc<dyn DocumentStore>>,
        wal: Option<Arc<dyn WriteAheadLog>>,
        config: DocumentConfig,
    ) -> Self {
        let metrics = Metrics::global();
        let mut state = None;
        let mut version = 0u64;
        let mut restored = false;

        if let Some(store) = &store {
            match store.load(id).await {
                Ok(Some(envelope)) => match decode_envelope(&schema, &envelope) {
                    Ok((loaded_state, loaded_version)) => {
                        state = loaded_state;
                        version = loaded_version;
                        restored = true;
                    }
                    Err(err) => {
                        metrics.storage.cold_load_failures.inc();
                        tracing::warn!(document = id, %err, "discarding undecodable snapshot");
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    metrics.storage.cold_load_failures.inc();
                    tracing::warn!(document = id, %err, "cold load failed, starting empty");
                }
            }
        }
        if !restored {
            state = schema.initial_state();
        }

        let (tx, _) = broadcast::channel(config.broadcast_buffer);
        let doc = Self {
            id: id.to_string(),
            schema,
            inner: RwLock::new(DocInner {
                state,
                version,
                seen: SeenSet::new(config.seen_transactions),
            }),
            broadcast: tx,
            store,
            wal: wal.clone(),
            config,
            last_activity: parking_lot::Mutex::new(Instant::now()),
            dirty: AtomicBool::new(false),
        };

        if wal.is_some() {
            doc.replay_wal().await;
        }
        if restored {
            metrics.documents.restored.inc();
        } else {
            metrics.documents.created.inc();
        }
        doc
    }

    /// Replay WAL entries after the restored snapshot. A version gap stops
    /// replay: the latest contiguous prefix wins and the gap is counted.
    async fn replay_wal(&self) {
        let metrics = Metrics::global();
        let wal = self.wal.as_ref().expect("caller checked");
        let mut inner = self.inner.write().await;
        let entries = match wal.entries(&self.id, inner.version + 1).await {
            Ok(entries) => entries,
            Err(err) => {
                metrics.storage.wal_load_failures.inc();
                tracing::warn!(document = %self.id, %err, "WAL read failed, skipping replay");
                return;
            }
        };
        for entry in entries {
            if entry.version != inner.version + 1 {
                metrics.storage.version_gaps.inc();
                tracing::warn!(
                    document = %self.id,
                    have = inner.version,
                    next = entry.version,
                    "version gap in WAL, keeping contiguous prefix"
                );
                break;
            }
            let mut state = inner.state.clone();
            let mut failed = false;
            for op in &entry.transaction.ops {
                match self.schema.apply_operation(state, op) {
                    Ok(next) => state = next,
                    Err(err) => {
                        metrics.storage.wal_load_failures.inc();
                        tracing::warn!(document = %self.id, version = entry.version, %err, "WAL entry failed to replay");
                        failed = true;
                        state = None;
                        break;
                    }
                }
            }
            if failed {
                // The contiguous prefix already applied stands
                break;
            }
            inner.state = state;
            inner.version = entry.version;
            inner.seen.insert(entry.transaction.id.clone());
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// The document id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Validate and apply one transaction, assign the next version, and
    /// broadcast to all subscribers. Exactly one transaction is in this
    /// section per document at a time.
    pub async fn submit(&self, tx: Transaction) -> Result<u64> {
        self.touch();
        let metrics = Metrics::global();
        let timer = Timer::start(metrics.transactions.latency.clone());

        let result = self.submit_locked(tx).await;
        match &result {
            Ok(_) => metrics.transactions.processed.inc(),
            Err(_) => metrics.transactions.rejected.inc(),
        }
        timer.finish();
        result
    }

    async fn submit_locked(&self, tx: Transaction) -> Result<u64> {
        let mut inner = self.inner.write().await;

        if tx.ops.is_empty() {
            return Err(TransactionError::Empty.into());
        }
        if inner.seen.contains(&tx.id) {
            return Err(TransactionError::Duplicate.into());
        }

        // Validate against a working copy; shared state stays untouched
        // until the commit below.
        let budget = self.config.apply_budget();
        let started = Instant::now();
        let mut next = inner.state.clone();
        for op in &tx.ops {
            next = self.schema.apply_operation(next, op)?;
            if started.elapsed() > budget {
                return Err(TransactionError::BudgetExceeded.into());
            }
        }

        let version = inner.version + 1;
        if let Some(wal) = &self.wal {
            wal.append(&self.id, WalEntry { version, transaction: tx.clone() })
                .await?;
            Metrics::global().storage.wal_appends.inc();
        }

        // Commit: no awaits from here until the lock drops.
        inner.state = next;
        inner.version = version;
        inner.seen.insert(tx.id.clone());
        self.dirty.store(true, Ordering::Relaxed);
        let _ = self
            .broadcast
            .send(ServerMessage::Transaction { transaction: tx, version });
        Ok(version)
    }

    /// Current state and version under the shared lock
    pub async fn snapshot(&self) -> ServerMessage {
        self.touch();
        let metrics = Metrics::global();
        let timer = Timer::start(metrics.documents.snapshot_latency.clone());
        let inner = self.inner.read().await;
        let message = ServerMessage::Snapshot {
            state: inner.state.as_ref().map(Value::to_json).unwrap_or(Json::Null),
            version: inner.version,
        };
        timer.finish();
        message
    }

    /// Current version
    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }

    /// Register a subscriber; the stream sees future broadcasts only
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.touch();
        self.broadcast.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.broadcast.receiver_count()
    }

    /// Persist a snapshot if anything changed since the last one
    pub async fn persist(&self) -> std::result::Result<(), StorageError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let envelope = {
            let inner = self.inner.read().await;
            json!({
                "state": inner.state.as_ref().map(Value::to_json).unwrap_or(Json::Null),
                "version": inner.version,
            })
        };
        match store.save(&self.id, &envelope).await {
            Ok(()) => {
                Metrics::global().storage.snapshots.inc();
                Ok(())
            }
            Err(err) => {
                // Still dirty; the next pass retries
                self.dirty.store(true, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Seconds since the last submit/snapshot/subscribe
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }
}

/// Split a persisted envelope into decoded state and version
fn decode_envelope(schema: &Primitive, envelope: &Json) -> Result<(Option<Value>, u64)> {
    let state_json = envelope.get("state").unwrap_or(&Json::Null);
    let version = envelope.get("version").and_then(Json::as_u64).unwrap_or(0);
    let state = schema.state_from_json(state_json)?;
    Ok((state, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::{OpKind, Operation};
    use crate::core::path::OperationPath;
    use crate::schema::{number, string, struct_of};
    use crate::storage::{MemStore, MemWal};

    fn schema() -> Arc<Primitive> {
        Arc::new(struct_of(vec![
            ("title", string().default_value("")),
            ("count", number().default_value(0i64)),
        ]))
    }

    fn set_title(value: &str) -> Transaction {
        Transaction::new(vec![Operation::new(
            OpKind::StringSet,
            OperationPath::from_tokens(["title"]),
            serde_json::json!(value),
        )])
    }

    async fn open_plain() -> ServerDocument {
        ServerDocument::open("doc-1", schema(), None, None, DocumentConfig::default()).await
    }

    #[tokio::test]
    async fn test_submit_assigns_contiguous_versions() {
        let doc = open_plain().await;
        assert_eq!(doc.submit(set_title("a")).await.unwrap(), 1);
        assert_eq!(doc.submit(set_title("b")).await.unwrap(), 2);
        assert_eq!(doc.submit(set_title("c")).await.unwrap(), 3);
        assert_eq!(doc.version().await, 3);
    }

    #[tokio::test]
    async fn test_empty_transaction_rejected() {
        let doc = open_plain().await;
        let err = doc.submit(Transaction::new(vec![])).await.unwrap_err();
        assert_eq!(err.reason(), "Transaction is empty");
        assert_eq!(doc.version().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_transaction_rejected_idempotently() {
        let doc = open_plain().await;
        let tx = set_title("x");
        assert_eq!(doc.submit(tx.clone()).await.unwrap(), 1);
        let err = doc.submit(tx).await.unwrap_err();
        assert_eq!(err.reason(), "Transaction has already been processed");
        assert_eq!(doc.version().await, 1);
    }

    #[tokio::test]
    async fn test_failed_apply_rolls_back_whole_transaction() {
        let doc = open_plain().await;
        let tx = Transaction::new(vec![
            Operation::new(
                OpKind::StringSet,
                OperationPath::from_tokens(["title"]),
                serde_json::json!("kept?"),
            ),
            Operation::new(
                OpKind::NumberSet,
                OperationPath::from_tokens(["count"]),
                serde_json::json!("not a number"),
            ),
        ]);
        assert!(doc.submit(tx).await.is_err());
        assert_eq!(doc.version().await, 0);
        match doc.snapshot().await {
            ServerMessage::Snapshot { state, version } => {
                assert_eq!(version, 0);
                assert_eq!(state["title"], serde_json::json!(""));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let doc = open_plain().await;
        let mut rx1 = doc.subscribe();
        let mut rx2 = doc.subscribe();
        doc.submit(set_title("fanout")).await.unwrap();
        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                ServerMessage::Transaction { version, transaction } => {
                    assert_eq!(version, 1);
                    assert_eq!(transaction.ops.len(), 1);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_wal_failure_rejects_and_rolls_back() {
        struct FailingWal;
        #[async_trait::async_trait]
        impl WriteAheadLog for FailingWal {
            async fn append(&self, _: &str, _: WalEntry) -> std::result::Result<(), StorageError> {
                Err(StorageError::WalAppend("disk full".into()))
            }
            async fn entries(
                &self,
                _: &str,
                _: u64,
            ) -> std::result::Result<Vec<WalEntry>, StorageError> {
                Ok(vec![])
            }
        }

        let doc = ServerDocument::open(
            "doc-1",
            schema(),
            None,
            Some(Arc::new(FailingWal)),
            DocumentConfig::default(),
        )
        .await;
        let err = doc.submit(set_title("x")).await.unwrap_err();
        assert!(err.reason().contains("disk full"));
        assert_eq!(doc.version().await, 0);
    }

    #[tokio::test]
    async fn test_persist_and_restore_round_trip() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemStore::new());
        let doc = ServerDocument::open(
            "doc-1",
            schema(),
            Some(store.clone()),
            None,
            DocumentConfig::default(),
        )
        .await;
        doc.submit(set_title("persisted")).await.unwrap();
        doc.persist().await.unwrap();

        let restored = ServerDocument::open(
            "doc-1",
            schema(),
            Some(store),
            None,
            DocumentConfig::default(),
        )
        .await;
        assert_eq!(restored.version().await, 1);
        match restored.snapshot().await {
            ServerMessage::Snapshot { state, .. } => {
                assert_eq!(state["title"], serde_json::json!("persisted"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wal_replay_stops_at_version_gap() {
        let wal: Arc<dyn WriteAheadLog> = Arc::new(MemWal::new());
        wal.append("doc-1", WalEntry { version: 1, transaction: set_title("one") })
            .await
            .unwrap();
        wal.append("doc-1", WalEntry { version: 2, transaction: set_title("two") })
            .await
            .unwrap();
        // gap: version 3 missing
        wal.append("doc-1", WalEntry { version: 4, transaction: set_title("four") })
            .await
            .unwrap();

        let doc = ServerDocument::open(
            "doc-1",
            schema(),
            None,
            Some(wal),
            DocumentConfig::default(),
        )
        .await;
        assert_eq!(doc.version().await, 2);
        match doc.snapshot().await {
            ServerMessage::Snapshot { state, .. } => {
                assert_eq!(state["title"], serde_json::json!("two"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
