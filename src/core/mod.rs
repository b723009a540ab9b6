//! Core foundations of the Concord document engine
//!
//! This module contains the fundamental building blocks shared by the
//! client and server halves: error handling, configuration, operation
//! paths, fractional index keys, and the operation/transaction model.

/// Error types and result handling
pub mod error;
/// Configuration management
pub mod config;
/// Operation paths
pub mod path;
/// Fractional index keys
pub mod fractional;
/// Operations and transactions
pub mod operation;
/// Application state and its factory
pub mod app_state;

// Re-export commonly used items
pub use app_state::{create_app_state, AppState};
pub use config::Config;
pub use error::{Error, Result};
pub use fractional::Charset;
pub use operation::{OpKind, Operation, Transaction};
pub use path::OperationPath;
