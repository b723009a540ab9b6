//! Ordered tree primitive
//!
//! Tree state is a flat node list `{id, type, parentId, pos, data}`.
//! Structural invariants, checked on every accepted operation: exactly one
//! root whose type equals the schema root type, every parent reference
//! resolves, no cycles, sibling order is the lexicographic order of `pos`,
//! and every node's type is an allowed child of its parent's type. Removal
//! cascades to all descendants.

use crate::core::error::SchemaError;
use crate::core::fractional::Charset;
use crate::core::operation::{OpKind, Operation};
use crate::schema::value::{sort_nodes, TreeNode};
use crate::schema::{Primitive, Result, Value};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};

/// A reference to a child type in a node declaration.
///
/// `SelfSame` is the placeholder for "this very type"; it is resolved to
/// the owning type's name in a single fix-up pass at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeChild {
    /// A named node type
    Named(String),
    /// The declaring node type itself
    SelfSame,
}

impl From<&str> for TreeChild {
    fn from(name: &str) -> Self {
        TreeChild::Named(name.to_string())
    }
}

/// Declaration of one node type, before fix-up
#[derive(Clone, Debug)]
pub struct TreeNodeDef {
    pub(crate) data: Primitive,
    pub(crate) children: Vec<TreeChild>,
}

impl TreeNodeDef {
    /// A node type carrying `data`, with no children allowed yet
    pub fn new(data: Primitive) -> Self {
        Self { data, children: Vec::new() }
    }

    /// Declare which node types may appear under this one
    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<TreeChild>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }
}

/// A resolved node type: data schema plus allowed child type names
#[derive(Clone, Debug)]
pub struct TreeNodeSchema {
    pub(crate) data: Primitive,
    pub(crate) children: Vec<String>,
}

impl TreeNodeSchema {
    /// Whether `child_type` may appear under this type
    pub fn allows_child(&self, child_type: &str) -> bool {
        self.children.iter().any(|c| c == child_type)
    }
}

/// A resolved tree schema
#[derive(Clone, Debug)]
pub struct TreeSchema {
    pub(crate) root_type: String,
    pub(crate) types: Vec<(String, TreeNodeSchema)>,
}

impl TreeSchema {
    /// The declared root node type
    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// Look up a node type by name
    pub fn node_type(&self, name: &str) -> Option<&TreeNodeSchema> {
        self.types.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// Build and validate a tree schema, resolving self references
pub(crate) fn build_schema<S: Into<String>>(
    root_type: &str,
    types: Vec<(S, TreeNodeDef)>,
) -> Result<TreeSchema> {
    let declared: Vec<(String, TreeNodeDef)> =
        types.into_iter().map(|(n, d)| (n.into(), d)).collect();

    for (i, (name, _)) in declared.iter().enumerate() {
        if declared[..i].iter().any(|(n, _)| n == name) {
            return Err(SchemaError::InvalidSchema(format!(
                "duplicate tree node type '{}'",
                name
            )));
        }
    }
    if !declared.iter().any(|(n, _)| n == root_type) {
        return Err(SchemaError::InvalidSchema(format!(
            "root type '{}' is not declared",
            root_type
        )));
    }

    // One-pass fix-up: self references become the owning type's name, and
    // every named reference must resolve.
    let names: HashSet<&str> = declared.iter().map(|(n, _)| n.as_str()).collect();
    let mut types = Vec::with_capacity(declared.len());
    for (name, def) in &declared {
        let mut children = Vec::with_capacity(def.children.len());
        for child in &def.children {
            let resolved = match child {
                TreeChild::SelfSame => name.clone(),
                TreeChild::Named(n) => {
                    if !names.contains(n.as_str()) {
                        return Err(SchemaError::InvalidSchema(format!(
                            "child type '{}' of '{}' is not declared",
                            n, name
                        )));
                    }
                    n.clone()
                }
            };
            children.push(resolved);
        }
        types.push((name.clone(), TreeNodeSchema { data: def.data.clone(), children }));
    }

    Ok(TreeSchema { root_type: root_type.to_string(), types })
}

/// A tree without a default synthesizes a single root node with default
/// data and the neutral position key.
pub(crate) fn initial_state(schema: &TreeSchema) -> Value {
    let data = schema
        .node_type(&schema.root_type)
        .and_then(|t| t.data.initial_state());
    Value::Nodes(vec![TreeNode {
        id: "root".to_string(),
        node_type: schema.root_type.clone(),
        parent_id: None,
        pos: Charset::base62().initial_key(),
        data,
    }])
}

/// Decode a `tree.set` payload: the full node list, then every invariant
pub(crate) fn decode(schema: &TreeSchema, json: &Json) -> Result<Value> {
    let items = json
        .as_array()
        .ok_or_else(|| SchemaError::InvalidPayload(format!("expected node array, got {}", json)))?;
    let mut nodes = Vec::with_capacity(items.len());
    for item in items {
        nodes.push(decode_node(schema, item)?);
    }
    validate_nodes(schema, &nodes)?;
    sort_nodes(&mut nodes);
    Ok(Value::Nodes(nodes))
}

fn decode_node(schema: &TreeSchema, json: &Json) -> Result<TreeNode> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaError::InvalidPayload(format!("expected node object, got {}", json)))?;
    let id = obj
        .get("id")
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SchemaError::InvalidPayload("missing node id".to_string()))?
        .to_string();
    let node_type = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| SchemaError::InvalidPayload("missing node type".to_string()))?
        .to_string();
    let type_schema = schema
        .node_type(&node_type)
        .ok_or_else(|| SchemaError::TreeInvariant(format!("unknown node type '{}'", node_type)))?;
    let parent_id = match obj.get("parentId") {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(other) => {
            return Err(SchemaError::InvalidPayload(format!(
                "invalid parentId {}",
                other
            )))
        }
    };
    let pos = obj
        .get("pos")
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SchemaError::InvalidPayload("missing position key".to_string()))?
        .to_string();
    let data = match obj.get("data").filter(|v| !v.is_null()) {
        Some(v) => Some(type_schema.data.decode_value(v)?),
        None => type_schema.data.initial_state(),
    };
    Ok(TreeNode { id, node_type, parent_id, pos, data })
}

/// Check every structural invariant over a full node list
pub(crate) fn validate_nodes(schema: &TreeSchema, nodes: &[TreeNode]) -> Result<()> {
    let mut by_id: HashMap<&str, &TreeNode> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if by_id.insert(node.id.as_str(), node).is_some() {
            return Err(SchemaError::TreeInvariant(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }

    let roots: Vec<&TreeNode> = nodes.iter().filter(|n| n.parent_id.is_none()).collect();
    if roots.len() != 1 {
        return Err(SchemaError::TreeInvariant(format!(
            "expected exactly one root, found {}",
            roots.len()
        )));
    }
    if roots[0].node_type != schema.root_type {
        return Err(SchemaError::TreeInvariant(format!(
            "root must be of type '{}', got '{}'",
            schema.root_type, roots[0].node_type
        )));
    }

    for node in nodes {
        if let Some(parent_id) = &node.parent_id {
            let parent = by_id.get(parent_id.as_str()).ok_or_else(|| {
                SchemaError::TreeInvariant(format!(
                    "node '{}' references missing parent '{}'",
                    node.id, parent_id
                ))
            })?;
            let parent_type = schema.node_type(&parent.node_type).ok_or_else(|| {
                SchemaError::TreeInvariant(format!("unknown node type '{}'", parent.node_type))
            })?;
            if !parent_type.allows_child(&node.node_type) {
                return Err(SchemaError::TreeInvariant(format!(
                    "type '{}' is not an allowed child of '{}'",
                    node.node_type, parent.node_type
                )));
            }
        }
    }

    // With parents resolving and a single root, a cycle is exactly a parent
    // chain that never reaches the root.
    for node in nodes {
        let mut current = node;
        let mut steps = 0;
        while let Some(parent_id) = &current.parent_id {
            steps += 1;
            if steps > nodes.len() {
                return Err(SchemaError::TreeInvariant(format!(
                    "cycle through node '{}'",
                    node.id
                )));
            }
            current = by_id[parent_id.as_str()];
        }
    }
    Ok(())
}

/// Ids of `id` and all its descendants
fn subtree_ids(nodes: &[TreeNode], id: &str) -> HashSet<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = &node.parent_id {
            children.entry(parent.as_str()).or_default().push(node.id.as_str());
        }
    }
    let mut out: HashSet<String> = HashSet::new();
    let mut queue = vec![id];
    while let Some(current) = queue.pop() {
        if out.insert(current.to_string()) {
            if let Some(kids) = children.get(current) {
                queue.extend(kids);
            }
        }
    }
    out
}

/// Apply `tree.insert` / `tree.remove` / `tree.move`
pub(crate) fn apply_structural(
    schema: &TreeSchema,
    state: Option<Value>,
    op: &Operation,
) -> Result<Value> {
    let mut nodes = match state {
        Some(Value::Nodes(nodes)) => nodes,
        None => Vec::new(),
        Some(other) => {
            return Err(SchemaError::InvalidPayload(format!(
                "expected tree state, got {:?}",
                other
            )))
        }
    };

    match op.kind {
        OpKind::TreeInsert => {
            let node = decode_node(schema, &op.payload)?;
            if nodes.iter().any(|n| n.id == node.id) {
                return Err(SchemaError::TreeInvariant(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            match &node.parent_id {
                None => {
                    if nodes.iter().any(|n| n.parent_id.is_none()) {
                        return Err(SchemaError::TreeInvariant(
                            "tree already has a root".to_string(),
                        ));
                    }
                    if node.node_type != schema.root_type {
                        return Err(SchemaError::TreeInvariant(format!(
                            "root must be of type '{}', got '{}'",
                            schema.root_type, node.node_type
                        )));
                    }
                }
                Some(parent_id) => {
                    let parent = nodes
                        .iter()
                        .find(|n| n.id == *parent_id)
                        .ok_or_else(|| SchemaError::UnknownNode(parent_id.clone()))?;
                    let parent_type = schema.node_type(&parent.node_type).ok_or_else(|| {
                        SchemaError::TreeInvariant(format!(
                            "unknown node type '{}'",
                            parent.node_type
                        ))
                    })?;
                    if !parent_type.allows_child(&node.node_type) {
                        return Err(SchemaError::TreeInvariant(format!(
                            "type '{}' is not an allowed child of '{}'",
                            node.node_type, parent.node_type
                        )));
                    }
                }
            }
            nodes.push(node);
            sort_nodes(&mut nodes);
        }
        OpKind::TreeRemove => {
            let id = payload_str(&op.payload, "id")?;
            if !nodes.iter().any(|n| n.id == id) {
                return Err(SchemaError::UnknownNode(id));
            }
            let doomed = subtree_ids(&nodes, &id);
            nodes.retain(|n| !doomed.contains(&n.id));
        }
        OpKind::TreeMove => {
            let id = payload_str(&op.payload, "id")?;
            let new_parent = payload_str(&op.payload, "parentId").map_err(|_| {
                SchemaError::TreeInvariant("the root position cannot be reassigned".to_string())
            })?;
            let pos = payload_str(&op.payload, "pos")?;

            let node = nodes
                .iter()
                .find(|n| n.id == id)
                .ok_or_else(|| SchemaError::UnknownNode(id.clone()))?;
            if node.parent_id.is_none() {
                return Err(SchemaError::TreeInvariant(
                    "the root cannot be reparented".to_string(),
                ));
            }
            let node_type = node.node_type.clone();

            let parent = nodes
                .iter()
                .find(|n| n.id == new_parent)
                .ok_or_else(|| SchemaError::UnknownNode(new_parent.clone()))?;
            let parent_type = schema.node_type(&parent.node_type).ok_or_else(|| {
                SchemaError::TreeInvariant(format!("unknown node type '{}'", parent.node_type))
            })?;
            if !parent_type.allows_child(&node_type) {
                return Err(SchemaError::TreeInvariant(format!(
                    "type '{}' is not an allowed child of '{}'",
                    node_type, parent.node_type
                )));
            }
            if subtree_ids(&nodes, &id).contains(&new_parent) {
                return Err(SchemaError::TreeInvariant(format!(
                    "moving '{}' under '{}' would create a cycle",
                    id, new_parent
                )));
            }

            let node = nodes
                .iter_mut()
                .find(|n| n.id == id)
                .expect("node located above");
            node.parent_id = Some(new_parent);
            node.pos = pos;
            sort_nodes(&mut nodes);
        }
        _ => unreachable!("caller matched structural kinds"),
    }
    Ok(Value::Nodes(nodes))
}

/// Delegate a nested operation to a node's data, addressed by node id
pub(crate) fn descend(
    schema: &TreeSchema,
    state: Option<Value>,
    op: &Operation,
    depth: usize,
) -> Result<Option<Value>> {
    let id = op.path.token(depth).expect("caller checked depth");
    let mut nodes = match state {
        Some(Value::Nodes(nodes)) => nodes,
        _ => return Err(SchemaError::UnknownNode(id.to_string())),
    };
    let node = nodes
        .iter_mut()
        .find(|n| n.id == id)
        .ok_or_else(|| SchemaError::UnknownNode(id.to_string()))?;
    let data_schema = schema
        .node_type(&node.node_type)
        .ok_or_else(|| SchemaError::TreeInvariant(format!("unknown node type '{}'", node.node_type)))?
        .data
        .clone();
    node.data = data_schema.apply_at(node.data.take(), op, depth + 1)?;
    Ok(Some(Value::Nodes(nodes)))
}

fn payload_str(payload: &Json, field: &str) -> Result<String> {
    payload
        .get(field)
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SchemaError::InvalidPayload(format!("missing {}", field)))
}
