//! Storage factory
//!
//! Builds the configured storage adapters. The WAL is memory-backed in
//! both modes; durable WAL adapters plug in behind the same trait.

use crate::core::config::StorageConfig;
use crate::storage::file_store::FileStore;
use crate::storage::mem_store::{MemStore, MemWal};
use crate::storage::store::{DocumentStore, WriteAheadLog};
use std::sync::Arc;

/// Build the configured snapshot store
pub fn build_store(config: &StorageConfig) -> Arc<dyn DocumentStore> {
    match config.backend.as_str() {
        "file" => Arc::new(FileStore::new(&config.data_dir)),
        _ => Arc::new(MemStore::new()),
    }
}

/// Build the write-ahead log, if enabled
pub fn build_wal(config: &StorageConfig) -> Option<Arc<dyn WriteAheadLog>> {
    if config.wal_enabled {
        Some(Arc::new(MemWal::new()))
    } else {
        None
    }
}
