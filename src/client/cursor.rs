//! Typed mutation cursors
//!
//! A [`Cursor`] is the user-facing mutation surface over a document: it
//! navigates the state tree by tokens (field names, element ids, node ids)
//! and records schema-validated operations into the owning document. Array
//! and tree helpers construct element ids and fractional position keys, so
//! callers think in indices while the wire carries stable keys.

use crate::core::error::{Result, SchemaError};
use crate::core::operation::{OpKind, Operation};
use crate::core::path::OperationPath;
use crate::client::document::Document;
use crate::schema::value::{ArrayEntry, TreeNode};
use crate::schema::{PrimitiveKind, Value};
use serde_json::{json, Value as Json};

/// A location in a document, ready to read or mutate
pub struct Cursor<'d> {
    doc: &'d mut Document,
    path: OperationPath,
}

impl<'d> Cursor<'d> {
    pub(crate) fn new(doc: &'d mut Document, path: OperationPath) -> Self {
        Self { doc, path }
    }

    /// Navigate into a field, array element or tree node
    pub fn at(self, token: impl Into<String>) -> Cursor<'d> {
        let path = self.path.append(token);
        Cursor { doc: self.doc, path }
    }

    /// The path this cursor addresses
    pub fn path(&self) -> &OperationPath {
        &self.path
    }

    /// Read the current value at this cursor
    pub fn get(&self) -> Option<Value> {
        self.doc.get(self.path.tokens()).cloned()
    }

    /// Read the current value as JSON (null when undefined)
    pub fn get_json(&self) -> Json {
        self.doc
            .get(self.path.tokens())
            .map(Value::to_json)
            .unwrap_or(Json::Null)
    }

    /// Replace the value at this cursor wholesale.
    ///
    /// The operation kind follows the primitive the path addresses, so one
    /// call works for scalars, structs, unions, arrays and trees.
    pub fn set(self, payload: Json) -> Result<()> {
        let primitive = self.doc.primitive_at(&self.path)?;
        let kind = match primitive.resolve().kind() {
            PrimitiveKind::String => OpKind::StringSet,
            PrimitiveKind::Number => OpKind::NumberSet,
            PrimitiveKind::Boolean => OpKind::BooleanSet,
            PrimitiveKind::Literal(_) => OpKind::LiteralSet,
            PrimitiveKind::Either(_) => OpKind::EitherSet,
            PrimitiveKind::Struct(_) => OpKind::StructSet,
            PrimitiveKind::Array(_) => OpKind::ArraySet,
            PrimitiveKind::Union(_) => OpKind::UnionSet,
            PrimitiveKind::Tree(_) => OpKind::TreeSet,
            PrimitiveKind::Lazy(_) => unreachable!("resolved above"),
        };
        self.doc.record(Operation::new(kind, self.path, payload))
    }

    // ----- ordered array helpers -----

    /// Append an element at the end; returns its generated id
    pub fn push(self, value: Json) -> Result<String> {
        let entries = self.entries()?;
        self.insert_between(entries.last().map(|e| e.pos.clone()), None, value)
    }

    /// Insert an element at a visual index; returns its generated id
    pub fn insert_at(self, index: usize, value: Json) -> Result<String> {
        let entries = self.entries()?;
        if index > entries.len() {
            return Err(SchemaError::InvalidPayload(format!(
                "index {} out of bounds for length {}",
                index,
                entries.len()
            ))
            .into());
        }
        let lower = index.checked_sub(1).map(|i| entries[i].pos.clone());
        let upper = entries.get(index).map(|e| e.pos.clone());
        self.insert_between(lower, upper, value)
    }

    /// Remove an element by id
    pub fn remove(self, id: &str) -> Result<()> {
        self.doc
            .record(Operation::new(OpKind::ArrayRemove, self.path, json!({"id": id})))
    }

    /// Move an element to a visual index among the remaining elements
    pub fn move_to(self, id: &str, index: usize) -> Result<()> {
        let entries = self.entries()?;
        let rest: Vec<&ArrayEntry> = entries.iter().filter(|e| e.id != id).collect();
        if index > rest.len() {
            return Err(SchemaError::InvalidPayload(format!(
                "index {} out of bounds for length {}",
                index,
                rest.len()
            ))
            .into());
        }
        let lower = index.checked_sub(1).map(|i| rest[i].pos.clone());
        let upper = rest.get(index).map(|e| e.pos.clone());
        let pos = self.generate_key(lower.as_deref(), upper.as_deref())?;
        self.doc.record(Operation::new(
            OpKind::ArrayMove,
            self.path,
            json!({"id": id, "pos": pos}),
        ))
    }

    fn insert_between(
        self,
        lower: Option<String>,
        upper: Option<String>,
        value: Json,
    ) -> Result<String> {
        let pos = self.generate_key(lower.as_deref(), upper.as_deref())?;
        let id = uuid::Uuid::new_v4().to_string();
        let mut payload = json!({"id": id, "pos": pos});
        if !value.is_null() {
            payload["value"] = value;
        }
        self.doc
            .record(Operation::new(OpKind::ArrayInsert, self.path, payload))?;
        Ok(id)
    }

    fn entries(&self) -> Result<Vec<ArrayEntry>> {
        match self.doc.get(self.path.tokens()) {
            Some(Value::Entries(entries)) => Ok(entries.clone()),
            None => Ok(Vec::new()),
            Some(other) => Err(SchemaError::InvalidPayload(format!(
                "expected array state, got {:?}",
                other
            ))
            .into()),
        }
    }

    // ----- tree helpers -----

    /// Insert a node as the last child of `parent` (`None` for a root in an
    /// empty tree); returns its generated id
    pub fn insert_node(
        self,
        parent: Option<&str>,
        node_type: &str,
        data: Json,
    ) -> Result<String> {
        let siblings = self.children_of(parent)?;
        let lower = siblings.last().map(|n| n.pos.clone());
        let pos = self.generate_key(lower.as_deref(), None)?;
        let id = uuid::Uuid::new_v4().to_string();
        let mut payload = json!({
            "id": id,
            "type": node_type,
            "parentId": parent.map(Json::from).unwrap_or(Json::Null),
            "pos": pos,
        });
        if !data.is_null() {
            payload["data"] = data;
        }
        self.doc
            .record(Operation::new(OpKind::TreeInsert, self.path, payload))?;
        Ok(id)
    }

    /// Remove a node and its whole subtree
    pub fn remove_node(self, id: &str) -> Result<()> {
        self.doc
            .record(Operation::new(OpKind::TreeRemove, self.path, json!({"id": id})))
    }

    /// Move a node under `parent` at a sibling index (self excluded)
    pub fn move_node(self, id: &str, parent: &str, index: usize) -> Result<()> {
        let siblings: Vec<TreeNode> = self
            .children_of(Some(parent))?
            .into_iter()
            .filter(|n| n.id != id)
            .collect();
        if index > siblings.len() {
            return Err(SchemaError::InvalidPayload(format!(
                "index {} out of bounds for length {}",
                index,
                siblings.len()
            ))
            .into());
        }
        let lower = index.checked_sub(1).map(|i| siblings[i].pos.clone());
        let upper = siblings.get(index).map(|n| n.pos.clone());
        let pos = self.generate_key(lower.as_deref(), upper.as_deref())?;
        self.doc.record(Operation::new(
            OpKind::TreeMove,
            self.path,
            json!({"id": id, "parentId": parent, "pos": pos}),
        ))
    }

    fn children_of(&self, parent: Option<&str>) -> Result<Vec<TreeNode>> {
        match self.doc.get(self.path.tokens()) {
            Some(Value::Nodes(nodes)) => Ok(nodes
                .iter()
                .filter(|n| n.parent_id.as_deref() == parent)
                .cloned()
                .collect()),
            None => Ok(Vec::new()),
            Some(other) => Err(SchemaError::InvalidPayload(format!(
                "expected tree state, got {:?}",
                other
            ))
            .into()),
        }
    }

    fn generate_key(&self, lower: Option<&str>, upper: Option<&str>) -> Result<String> {
        let key = if self.doc.jitter() > 0 {
            self.doc
                .charset()
                .key_between_jittered(lower, upper, self.doc.jitter())?
        } else {
            self.doc.charset().key_between(lower, upper)?
        };
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{array_of, number, string, struct_of, tree, TreeChild, TreeNodeDef};
    use serde_json::json;

    fn list_doc() -> Document {
        Document::new(struct_of(vec![(
            "todos",
            array_of(struct_of(vec![("label", string().default_value(""))])),
        )]))
    }

    fn order(doc: &Document) -> Vec<String> {
        match doc.get(&["todos".to_string()]) {
            Some(Value::Entries(entries)) => entries.iter().map(|e| e.id.clone()).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_push_appends_in_order() {
        let mut doc = list_doc();
        let a = doc.root().at("todos").push(json!({"label": "a"})).unwrap();
        let b = doc.root().at("todos").push(json!({"label": "b"})).unwrap();
        assert_eq!(order(&doc), vec![a, b]);
    }

    #[test]
    fn test_insert_at_lands_between_neighbours() {
        let mut doc = list_doc();
        let a = doc.root().at("todos").push(json!({"label": "a"})).unwrap();
        let b = doc.root().at("todos").push(json!({"label": "b"})).unwrap();
        let c = doc.root().at("todos").push(json!({"label": "c"})).unwrap();
        let x = doc
            .root()
            .at("todos")
            .insert_at(1, json!({"label": "x"}))
            .unwrap();
        assert_eq!(order(&doc), vec![a, x, b, c]);
    }

    #[test]
    fn test_move_to_end() {
        let mut doc = list_doc();
        let a = doc.root().at("todos").push(json!({"label": "a"})).unwrap();
        let b = doc.root().at("todos").push(json!({"label": "b"})).unwrap();
        let c = doc.root().at("todos").push(json!({"label": "c"})).unwrap();
        let x = doc
            .root()
            .at("todos")
            .insert_at(1, json!({"label": "x"}))
            .unwrap();
        doc.root().at("todos").move_to(&x, 3).unwrap();
        assert_eq!(order(&doc), vec![a, b, c, x]);
    }

    #[test]
    fn test_nested_cursor_addresses_element() {
        let mut doc = list_doc();
        let a = doc.root().at("todos").push(json!({"label": "a"})).unwrap();
        doc.root()
            .at("todos")
            .at(a.as_str())
            .at("label")
            .set(json!("renamed"))
            .unwrap();
        let tokens: Vec<String> = vec!["todos".into(), a, "label".into()];
        assert_eq!(doc.get(&tokens).and_then(|v| v.as_str().map(String::from)), Some("renamed".into()));
    }

    #[test]
    fn test_out_of_bounds_index_rejected() {
        let mut doc = list_doc();
        assert!(doc.root().at("todos").insert_at(3, json!({})).is_err());
    }

    #[test]
    fn test_tree_cursor_inserts_and_moves() {
        let mut doc = Document::new(struct_of(vec![(
            "outline",
            tree(
                "folder",
                vec![
                    (
                        "folder",
                        TreeNodeDef::new(struct_of(vec![("name", string().default_value(""))]))
                            .children([TreeChild::SelfSame, TreeChild::from("file")]),
                    ),
                    (
                        "file",
                        TreeNodeDef::new(struct_of(vec![("name", string().default_value(""))])),
                    ),
                ],
            )
            .unwrap(),
        )]));

        let d1 = doc
            .root()
            .at("outline")
            .insert_node(Some("root"), "folder", json!({"name": "docs"}))
            .unwrap();
        let f1 = doc
            .root()
            .at("outline")
            .insert_node(Some(d1.as_str()), "file", json!({"name": "a.txt"}))
            .unwrap();
        doc.root().at("outline").move_node(&f1, "root", 0).unwrap();

        let nodes = match doc.get(&["outline".to_string()]) {
            Some(Value::Nodes(nodes)) => nodes.clone(),
            _ => panic!("expected tree state"),
        };
        let moved = nodes.iter().find(|n| n.id == f1).unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some("root"));

        // root cannot be reparented
        assert!(doc.root().at("outline").move_node("root", &d1, 0).is_err());
    }

    #[test]
    fn test_scalar_read_through_cursor() {
        let mut doc = Document::new(struct_of(vec![("count", number().default_value(2i64))]));
        assert_eq!(doc.root().at("count").get_json(), json!(2.0));
    }
}
