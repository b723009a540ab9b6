//! Error types and handling for the Concord document engine
//!
//! This module defines all error types used throughout the system,
//! optimized for zero-cost error propagation and clear diagnostics.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Concord document engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema construction or operation-apply errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Fractional index errors
    #[error("Fractional index error: {0}")]
    Fractional(#[from] FractionalError),

    /// Transaction lifecycle errors
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Authentication and permission errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Construct a configuration error from any displayable message
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// The message surfaced to a submitting client, without the top-level
    /// wrapper prefix: `"Transaction is empty"`, not
    /// `"Transaction error: Transaction is empty"`.
    pub fn reason(&self) -> String {
        match self {
            Error::Schema(e) => e.to_string(),
            Error::Fractional(e) => e.to_string(),
            Error::Transaction(e) => e.to_string(),
            Error::Storage(e) => e.to_string(),
            Error::Auth(e) => e.to_string(),
            Error::Protocol(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors produced by the schema algebra, both at construction time and
/// while applying operations to document state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Operation kind is not supported by the primitive at its path
    #[error("Operation kind '{kind}' is not valid for {primitive}")]
    InvalidKind {
        /// Wire name of the offending kind
        kind: String,
        /// Human name of the primitive that rejected it
        primitive: &'static str,
    },

    /// Operation payload does not match the primitive's expected shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Operation path walks past a scalar or names an unknown field
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// Operation path or payload names an array element that does not exist
    #[error("Unknown array element '{0}'")]
    UnknownElement(String),

    /// Operation path or payload names a tree node that does not exist
    #[error("Unknown tree node '{0}'")]
    UnknownNode(String),

    /// Operation path continues below a leaf primitive
    #[error("Path extends below a {0} primitive")]
    PathTooDeep(&'static str),

    /// A required field is missing from a set payload
    #[error("Missing required field '{0}'")]
    MissingRequired(String),

    /// A user-declared refinement predicate rejected the value
    #[error("Refinement failed: {0}")]
    Refinement(String),

    /// A tree structural invariant would be violated
    #[error("Tree invariant violated: {0}")]
    TreeInvariant(String),

    /// Schema construction: an Either with colliding literal/scalar variants
    #[error("Ambiguous either: {0}")]
    AmbiguousEither(String),

    /// Schema construction: invalid descriptor graph
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

/// Errors from fractional index key construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FractionalError {
    /// Charset failed its construction-time preconditions
    #[error("Invalid charset: {0}")]
    InvalidCharset(String),

    /// A key contains characters outside the charset or a malformed head
    #[error("Invalid key '{0}'")]
    InvalidKey(String),

    /// `lower >= upper`
    #[error("Key order violated: '{lower}' >= '{upper}'")]
    OrderViolation {
        /// The lower bound that was passed
        lower: String,
        /// The upper bound that was passed
        upper: String,
    },

    /// The integer head range is exhausted
    #[error("Key range exhausted")]
    RangeExhausted,
}

/// Errors surfaced by the transaction lifecycle on client and server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// A transaction with no operations reached the server
    #[error("Transaction is empty")]
    Empty,

    /// The transaction id was already applied
    #[error("Transaction has already been processed")]
    Duplicate,

    /// A nested `transaction()` call on the client
    #[error("Transactions cannot be nested")]
    Nested,

    /// Flush or submit attempted from inside an open transaction scope
    #[error("Operation not allowed inside a transaction")]
    InTransaction,

    /// Applying the transaction exceeded the configured time budget
    #[error("Transaction apply budget exceeded")]
    BudgetExceeded,
}

/// Storage adapter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Snapshot load failed
    #[error("Load failed: {0}")]
    Load(String),

    /// Snapshot save failed
    #[error("Save failed: {0}")]
    Save(String),

    /// Snapshot delete failed
    #[error("Delete failed: {0}")]
    Delete(String),

    /// Write-ahead log append failed
    #[error("WAL append failed: {0}")]
    WalAppend(String),

    /// Write-ahead log read failed
    #[error("WAL read failed: {0}")]
    WalRead(String),

    /// A load/save transform hook rejected the payload
    #[error("Transform hook failed: {0}")]
    Transform(String),
}

/// Authentication capability errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token was rejected
    #[error("Invalid token")]
    InvalidToken,

    /// The token is valid but grants no access to this document
    #[error("Access denied for document '{0}'")]
    AccessDenied(String),

    /// The auth backend failed
    #[error("Authentication service error: {0}")]
    Backend(String),
}

/// Wire protocol errors (connection-level, not per-transaction)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame could not be parsed as a known message
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The connection path carried no document id
    #[error("Missing document id in path '{0}'")]
    MissingDocumentId(String),

    /// A message arrived in a state that cannot accept it
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Write attempted with a read-only grant
    #[error("permission denied")]
    PermissionDenied,
}
