//! Operations and transactions
//!
//! An [`Operation`] is a typed, path-addressed, minimal mutation on document
//! state. A [`Transaction`] is an ordered, atomic bundle of operations with
//! a stable id and a millisecond timestamp; it is the unit of persistence
//! and broadcast.

use crate::core::error::ProtocolError;
use crate::core::path::OperationPath;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Closed set of operation kinds, namespaced by primitive.
///
/// Deduplicability is a property of the kind: wholesale `*.set` replacements
/// collapse under [`Transaction::deduplicate`], structural edits never do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Replace a string scalar
    StringSet,
    /// Replace a number scalar
    NumberSet,
    /// Replace a boolean scalar
    BooleanSet,
    /// Replace a literal (payload must equal the declared literal)
    LiteralSet,
    /// Replace a scalar union value
    EitherSet,
    /// Replace a struct wholesale
    StructSet,
    /// Replace an array's entry list wholesale
    ArraySet,
    /// Insert one `{id, pos, value}` entry
    ArrayInsert,
    /// Remove an entry by id
    ArrayRemove,
    /// Update an entry's position
    ArrayMove,
    /// Replace a tagged-union value
    UnionSet,
    /// Replace a tree's node list wholesale
    TreeSet,
    /// Insert one node under a parent
    TreeInsert,
    /// Remove a node and all its descendants
    TreeRemove,
    /// Reparent and/or reposition a node
    TreeMove,
}

impl OpKind {
    /// All kinds, in wire-name order
    pub const ALL: [OpKind; 15] = [
        OpKind::StringSet,
        OpKind::NumberSet,
        OpKind::BooleanSet,
        OpKind::LiteralSet,
        OpKind::EitherSet,
        OpKind::StructSet,
        OpKind::ArraySet,
        OpKind::ArrayInsert,
        OpKind::ArrayRemove,
        OpKind::ArrayMove,
        OpKind::UnionSet,
        OpKind::TreeSet,
        OpKind::TreeInsert,
        OpKind::TreeRemove,
        OpKind::TreeMove,
    ];

    /// The dotted wire name, e.g. `array.insert`
    pub fn wire_name(&self) -> &'static str {
        match self {
            OpKind::StringSet => "string.set",
            OpKind::NumberSet => "number.set",
            OpKind::BooleanSet => "boolean.set",
            OpKind::LiteralSet => "literal.set",
            OpKind::EitherSet => "either.set",
            OpKind::StructSet => "struct.set",
            OpKind::ArraySet => "array.set",
            OpKind::ArrayInsert => "array.insert",
            OpKind::ArrayRemove => "array.remove",
            OpKind::ArrayMove => "array.move",
            OpKind::UnionSet => "union.set",
            OpKind::TreeSet => "tree.set",
            OpKind::TreeInsert => "tree.insert",
            OpKind::TreeRemove => "tree.remove",
            OpKind::TreeMove => "tree.move",
        }
    }

    /// Parse a dotted wire name
    pub fn from_wire_name(name: &str) -> Option<Self> {
        OpKind::ALL.iter().copied().find(|k| k.wire_name() == name)
    }

    /// Whether consecutive same-path occurrences collapse to the last one
    pub fn deduplicable(&self) -> bool {
        matches!(
            self,
            OpKind::StringSet
                | OpKind::NumberSet
                | OpKind::BooleanSet
                | OpKind::LiteralSet
                | OpKind::EitherSet
                | OpKind::StructSet
                | OpKind::ArraySet
                | OpKind::UnionSet
                | OpKind::TreeSet
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl Serialize for OpKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> Deserialize<'de> for OpKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        OpKind::from_wire_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown operation kind '{}'", name)))
    }
}

/// A single path-addressed mutation. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// What to do, namespaced by primitive
    pub kind: OpKind,
    /// Where in the document state tree
    pub path: OperationPath,
    /// Kind-specific payload, interpreted by the schema on apply
    pub payload: serde_json::Value,
}

impl Operation {
    /// Build an operation
    pub fn new(kind: OpKind, path: OperationPath, payload: serde_json::Value) -> Self {
        Self { kind, path, payload }
    }

    /// Whether this op collapses with a consecutive same-path op
    pub fn deduplicable(&self) -> bool {
        self.kind.deduplicable()
    }
}

/// An ordered, atomic bundle of operations.
///
/// Ops apply in array order; the id makes redelivery idempotent on the
/// server. Wire shape is `{id, ops, timestamp}` with camelCase fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Stable unique id (uuid v4 on this client)
    pub id: String,
    /// Operations, applied in order
    pub ops: Vec<Operation>,
    /// Client wall-clock, integer milliseconds since the epoch
    pub timestamp: u64,
}

impl Transaction {
    /// Build a transaction with a fresh uuid and the current time
    pub fn new(ops: Vec<Operation>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ops,
            timestamp: now_millis(),
        }
    }

    /// Encode to a JSON byte frame
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("transaction serialization is infallible")
    }

    /// Decode from a JSON byte frame
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }

    /// Collapse runs of consecutive deduplicable ops on the same path down
    /// to the last one, preserving order otherwise.
    pub fn deduplicate(mut self) -> Self {
        self.ops = deduplicate_ops(self.ops);
        self
    }
}

/// Collapse consecutive deduplicable same-path ops to the last occurrence
pub fn deduplicate_ops(ops: Vec<Operation>) -> Vec<Operation> {
    let mut out: Vec<Operation> = Vec::with_capacity(ops.len());
    for op in ops {
        match out.last() {
            Some(prev)
                if prev.deduplicable() && op.deduplicable() && prev.path == op.path =>
            {
                *out.last_mut().expect("non-empty") = op;
            }
            _ => out.push(op),
        }
    }
    out
}

/// Current wall-clock in integer milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(kind: OpKind, path: &[&str], payload: serde_json::Value) -> Operation {
        Operation::new(kind, OperationPath::from_tokens(path.to_vec()), payload)
    }

    #[test]
    fn test_wire_names_round_trip() {
        for kind in OpKind::ALL {
            assert_eq!(OpKind::from_wire_name(kind.wire_name()), Some(kind));
        }
        assert_eq!(OpKind::from_wire_name("array.shuffle"), None);
    }

    #[test]
    fn test_kind_serde_uses_wire_names() {
        let json = serde_json::to_value(OpKind::ArrayInsert).unwrap();
        assert_eq!(json, json!("array.insert"));
        let kind: OpKind = serde_json::from_value(json!("tree.move")).unwrap();
        assert_eq!(kind, OpKind::TreeMove);
        assert!(serde_json::from_value::<OpKind>(json!("nope.set")).is_err());
    }

    #[test]
    fn test_transaction_encode_decode_round_trip() {
        let tx = Transaction::new(vec![
            op(OpKind::StringSet, &["title"], json!("Hello")),
            op(
                OpKind::ArrayInsert,
                &["todos"],
                json!({"id": "e1", "pos": "a0", "value": {"label": "x"}}),
            ),
        ]);
        let decoded = Transaction::decode(&tx.encode()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let tx = Transaction::new(vec![op(OpKind::NumberSet, &["count"], json!(3))]);
        let v = serde_json::to_value(&tx).unwrap();
        assert!(v.get("id").is_some());
        assert!(v.get("timestamp").is_some());
        assert_eq!(v["ops"][0]["kind"], json!("number.set"));
        assert_eq!(v["ops"][0]["path"], json!({"segments": ["count"]}));
    }

    #[test]
    fn test_deduplicate_collapses_consecutive_sets() {
        let ops = vec![
            op(OpKind::StringSet, &["title"], json!("a")),
            op(OpKind::StringSet, &["title"], json!("b")),
            op(OpKind::StringSet, &["title"], json!("c")),
            op(OpKind::NumberSet, &["count"], json!(1)),
            op(OpKind::StringSet, &["title"], json!("d")),
        ];
        let out = deduplicate_ops(ops);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].payload, json!("c"));
        assert_eq!(out[1].payload, json!(1));
        assert_eq!(out[2].payload, json!("d"));
    }

    #[test]
    fn test_deduplicate_keeps_structural_ops() {
        let ops = vec![
            op(OpKind::ArrayInsert, &["todos"], json!({"id": "1", "pos": "a0", "value": "x"})),
            op(OpKind::ArrayInsert, &["todos"], json!({"id": "2", "pos": "a1", "value": "y"})),
        ];
        assert_eq!(deduplicate_ops(ops).len(), 2);
    }

    #[test]
    fn test_distinct_paths_do_not_collapse() {
        let ops = vec![
            op(OpKind::StringSet, &["a"], json!("1")),
            op(OpKind::StringSet, &["b"], json!("2")),
        ];
        assert_eq!(deduplicate_ops(ops).len(), 2);
    }
}
