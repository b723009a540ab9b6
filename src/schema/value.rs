//! Document state values
//!
//! A [`Value`] is a node in a document's state tree, shaped by the schema
//! that produced it. Scalars hold native values; structs and unions are
//! field maps; arrays are `{id, pos, value}` entry lists sorted by `pos`;
//! trees are flat node lists. "Undefined" is represented as the absence of
//! a value (`Option<Value>`), never as a variant.
//!
//! State encodes to plain JSON for snapshots and persistence; decoding is
//! schema-driven (see [`crate::schema::Primitive::decode_value`]), so a raw
//! JSON value is never blindly deserialized into state.

use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;
use std::fmt;

/// One node in a document state tree
#[derive(Clone, PartialEq)]
pub enum Value {
    /// Boolean scalar
    Bool(bool),
    /// Numeric scalar
    Number(f64),
    /// String scalar
    String(String),
    /// Struct or union state: declared field name -> field state
    Object(BTreeMap<String, Value>),
    /// Ordered array state, sorted by `(pos, id)`
    Entries(Vec<ArrayEntry>),
    /// Flat tree state, sorted by `(pos, id)`
    Nodes(Vec<TreeNode>),
}

/// One keyed entry of an ordered array
#[derive(Clone, PartialEq)]
pub struct ArrayEntry {
    /// Unique id within the array
    pub id: String,
    /// Fractional position key; visual order is the lexicographic order
    pub pos: String,
    /// Element state (may be undefined)
    pub value: Option<Value>,
}

/// One node of a tree, stored flat with a parent reference
#[derive(Clone, PartialEq)]
pub struct TreeNode {
    /// Unique node id within the tree
    pub id: String,
    /// Declared node type name
    pub node_type: String,
    /// Parent node id; `None` marks the single root
    pub parent_id: Option<String>,
    /// Fractional position key among siblings
    pub pos: String,
    /// Node payload state (may be undefined)
    pub data: Option<Value>,
}

impl Value {
    /// Read the value at `tokens`, walking fields, array entries by id and
    /// tree nodes by id. Union states are objects, so their fields resolve
    /// without an extra token.
    pub fn walk<'a>(&'a self, tokens: &[String]) -> Option<&'a Value> {
        let mut current = self;
        for token in tokens {
            current = match current {
                Value::Object(fields) => fields.get(token)?,
                Value::Entries(entries) => entries
                    .iter()
                    .find(|e| e.id == *token)?
                    .value
                    .as_ref()?,
                Value::Nodes(nodes) => nodes
                    .iter()
                    .find(|n| n.id == *token)?
                    .data
                    .as_ref()?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Encode to plain JSON for snapshots and persistence
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (name, value) in fields {
                    map.insert(name.clone(), value.to_json());
                }
                Json::Object(map)
            }
            Value::Entries(entries) => Json::Array(
                entries
                    .iter()
                    .map(|e| {
                        let mut obj = json!({"id": e.id, "pos": e.pos});
                        if let Some(v) = &e.value {
                            obj["value"] = v.to_json();
                        }
                        obj
                    })
                    .collect(),
            ),
            Value::Nodes(nodes) => Json::Array(
                nodes
                    .iter()
                    .map(|n| {
                        let mut obj = json!({
                            "id": n.id,
                            "type": n.node_type,
                            "parentId": n.parent_id.as_deref().map(Json::from).unwrap_or(Json::Null),
                            "pos": n.pos,
                        });
                        if let Some(d) = &n.data {
                            obj["data"] = d.to_json();
                        }
                        obj
                    })
                    .collect(),
            ),
        }
    }

    /// Borrow as a field map, if this is object-shaped state
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Borrow as array entries, if this is array state
    pub fn as_entries(&self) -> Option<&[ArrayEntry]> {
        match self {
            Value::Entries(entries) => Some(entries),
            _ => None,
        }
    }

    /// Borrow as tree nodes, if this is tree state
    pub fn as_nodes(&self) -> Option<&[TreeNode]> {
        match self {
            Value::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// Borrow as a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a numeric scalar
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow as a boolean scalar
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Sort array entries into visual order: lexicographic `(pos, id)`
pub fn sort_entries(entries: &mut [ArrayEntry]) {
    entries.sort_by(|a, b| a.pos.cmp(&b.pos).then_with(|| a.id.cmp(&b.id)));
}

/// Sort tree nodes by `(pos, id)`; sibling groups read off in order
pub fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| a.pos.cmp(&b.pos).then_with(|| a.id.cmp(&b.id)));
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(fields) => f.debug_map().entries(fields.iter()).finish(),
            Value::Entries(entries) => f.debug_list().entries(entries.iter()).finish(),
            Value::Nodes(nodes) => f.debug_list().entries(nodes.iter()).finish(),
        }
    }
}

impl fmt::Debug for ArrayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}={:?}", self.id, self.pos, self.value)
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})<-{:?}@{}",
            self.id, self.node_type, self.parent_id, self.pos
        )
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
