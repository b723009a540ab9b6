//! Client-side document engine
//!
//! The [`Document`] owns local state and a pending-operations buffer;
//! [`Cursor`]s are the typed mutation surface over it. The usual loop:
//! mutate through cursors (directly or inside [`Document::transaction`]),
//! [`Document::flush`] the buffered ops into a transaction for the server,
//! and [`Document::integrate`] transactions broadcast back.

/// Client document handle
pub mod document;
/// Typed mutation cursors
pub mod cursor;

pub use cursor::Cursor;
pub use document::Document;
