//! Ephemeral presence channel
//!
//! Presence is a per-document keyed map of connection id to an opaque
//! payload, broadcast on its own channel: never persisted, never versioned,
//! and not ordered relative to transactions. Subscribers filter out events
//! carrying their own connection id, so a connection never hears its own
//! updates echoed back.

use crate::protocol::PresenceEntry;
use crate::system::metrics::Metrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One presence event on a document's channel
#[derive(Clone, Debug)]
pub enum PresenceEvent {
    /// A connection set or updated its entry
    Update {
        /// Originating connection id
        id: String,
        /// The new entry
        entry: PresenceEntry,
    },
    /// A connection's entry was removed
    Remove {
        /// Originating connection id
        id: String,
    },
}

struct DocPresence {
    entries: Mutex<HashMap<String, PresenceEntry>>,
    events: broadcast::Sender<PresenceEvent>,
}

/// Per-document presence maps with event broadcast
pub struct PresenceManager {
    docs: DashMap<String, Arc<DocPresence>>,
    broadcast_buffer: usize,
}

impl PresenceManager {
    /// Create a manager with the given per-document event buffer
    pub fn new(broadcast_buffer: usize) -> Self {
        Self { docs: DashMap::new(), broadcast_buffer }
    }

    fn doc(&self, document_id: &str) -> Arc<DocPresence> {
        self.docs
            .entry(document_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.broadcast_buffer);
                Arc::new(DocPresence { entries: Mutex::new(HashMap::new()), events: tx })
            })
            .clone()
    }

    /// Upsert a connection's presence entry and broadcast the update
    pub fn set(&self, document_id: &str, connection_id: &str, entry: PresenceEntry) {
        let doc = self.doc(document_id);
        doc.entries
            .lock()
            .insert(connection_id.to_string(), entry.clone());
        let metrics = Metrics::global();
        metrics.presence.updates.inc();
        metrics.presence.active.set(self.total_entries() as i64);
        let _ = doc.events.send(PresenceEvent::Update {
            id: connection_id.to_string(),
            entry,
        });
    }

    /// Remove a connection's entry; broadcasts only on actual deletion
    pub fn remove(&self, document_id: &str, connection_id: &str) {
        let Some(doc) = self.docs.get(document_id).map(|d| d.value().clone()) else {
            return;
        };
        let removed = doc.entries.lock().remove(connection_id).is_some();
        if removed {
            let _ = doc.events.send(PresenceEvent::Remove {
                id: connection_id.to_string(),
            });
            Metrics::global()
                .presence
                .active
                .set(self.total_entries() as i64);
        }
        // Drop empty per-document maps once nobody listens
        self.docs.remove_if(document_id, |_, d| {
            d.entries.lock().is_empty() && d.events.receiver_count() == 0
        });
    }

    /// Current presence map for a document (possibly empty)
    pub fn snapshot(&self, document_id: &str) -> HashMap<String, PresenceEntry> {
        self.docs
            .get(document_id)
            .map(|doc| doc.entries.lock().clone())
            .unwrap_or_default()
    }

    /// Subscribe to one document's presence events
    pub fn subscribe(&self, document_id: &str) -> broadcast::Receiver<PresenceEvent> {
        self.doc(document_id).events.subscribe()
    }

    fn total_entries(&self) -> usize {
        self.docs.iter().map(|doc| doc.entries.lock().len()).sum()
    }
}
