//! Concord - A Real-Time Collaborative Document Engine
//!
//! Clients mutate a schema-shaped document locally, emit transactions of
//! fine-grained operations, and a server applies, orders and broadcasts
//! those transactions so every participant converges on the same state.
//! Ordered collections and trees keep their positions with fractional
//! index keys; concurrent edits reconcile through operational
//! transformation; presence rides a parallel ephemeral channel.
#![warn(missing_docs)]

// Configure global allocator for maximum performance
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

// Core foundational modules
pub mod core;

// Document model
pub mod schema;
pub mod client;

// Server side
pub mod server;
pub mod protocol;
pub mod auth;
pub mod storage;
pub mod api;
pub mod system;

// Re-export commonly used items for convenience
pub use client::{Cursor, Document};
pub use core::{Charset, Config, Error, OpKind, Operation, OperationPath, Result, Transaction};
pub use schema::Primitive;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing and the metrics registry
pub fn init(logging: &core::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!("Initializing {} v{}", NAME, VERSION);

    system::metrics::init_registry();
}
