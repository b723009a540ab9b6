//! Durable storage capabilities
//!
//! Snapshot stores and the optional write-ahead log live behind narrow
//! traits; the server never sees adapter details. Shipped adapters:
//! in-memory (default, also the test double) and a JSON-file store.

/// Storage capability traits and the hook wrapper
pub mod store;
/// In-memory adapters
pub mod mem_store;
/// File-backed snapshot store
pub mod file_store;
/// Configured adapter construction
pub mod factory;

pub use factory::{build_store, build_wal};
pub use file_store::FileStore;
pub use mem_store::{MemStore, MemWal};
pub use store::{DocumentStore, HookedStore, WalEntry, WriteAheadLog};
