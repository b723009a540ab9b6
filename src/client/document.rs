//! Client-side document handle
//!
//! A [`Document`] owns the current state, a pending-operations buffer and a
//! non-nestable transaction scope. Mutations go through [`Cursor`]s built
//! from [`Document::root`]; each recorded operation is applied to state
//! immediately (so reads observe intermediate effects) and buffered for the
//! next [`Document::flush`].

use crate::client::cursor::Cursor;
use crate::core::error::{Error, Result, TransactionError};
use crate::core::fractional::Charset;
use crate::core::operation::{deduplicate_ops, Operation, Transaction};
use crate::core::path::OperationPath;
use crate::schema::{transform, Primitive, TransformResult, Value};
use serde_json::Value as Json;
use std::sync::Arc;

/// Client-side handle for one collaborative document
pub struct Document {
    schema: Arc<Primitive>,
    charset: Charset,
    jitter: u64,
    state: Option<Value>,
    pending: Vec<Operation>,
    scope: Option<TxScope>,
}

/// Open transaction scope: the pre-transaction state and collected ops
struct TxScope {
    base: Option<Value>,
    ops: Vec<Operation>,
}

impl Document {
    /// Create a document with the schema's initial state
    pub fn new(schema: Primitive) -> Self {
        let state = schema.initial_state();
        Self {
            schema: Arc::new(schema),
            charset: Charset::base62(),
            jitter: 0,
            state,
            pending: Vec::new(),
            scope: None,
        }
    }

    /// Create a document from an existing state value
    pub fn with_state(schema: Primitive, state: Option<Value>) -> Self {
        Self {
            schema: Arc::new(schema),
            charset: Charset::base62(),
            jitter: 0,
            state,
            pending: Vec::new(),
            scope: None,
        }
    }

    /// Create a document from a JSON snapshot (schema-validated)
    pub fn from_snapshot(schema: Primitive, state: &Json) -> Result<Self> {
        let decoded = schema.state_from_json(state)?;
        Ok(Self::with_state(schema, decoded))
    }

    /// Use a custom fractional charset and jitter for position keys
    pub fn with_fractional(mut self, charset: Charset, jitter: u64) -> Self {
        self.charset = charset;
        self.jitter = jitter;
        self
    }

    /// The document schema
    pub fn schema(&self) -> &Primitive {
        &self.schema
    }

    /// The fractional charset used for position keys
    pub(crate) fn charset(&self) -> &Charset {
        &self.charset
    }

    /// Jitter amplitude for generated position keys
    pub(crate) fn jitter(&self) -> u64 {
        self.jitter
    }

    /// Current state (undefined for schemas with no defaults)
    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    /// Read the value at a path
    pub fn get(&self, tokens: &[String]) -> Option<&Value> {
        self.state.as_ref()?.walk(tokens)
    }

    /// Number of buffered operations
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Cursor at the document root
    pub fn root(&mut self) -> Cursor<'_> {
        Cursor::new(self, OperationPath::root())
    }

    /// Run `f` atomically: ops apply to state as they are recorded, and on
    /// success they join the pending buffer; on error state is restored and
    /// the collected ops are discarded. Transactions do not nest.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        if self.scope.is_some() {
            return Err(TransactionError::Nested.into());
        }
        self.scope = Some(TxScope { base: self.state.clone(), ops: Vec::new() });
        let result = f(self);
        let scope = self.scope.take().expect("scope opened above");
        match result {
            Ok(value) => {
                self.pending.extend(scope.ops);
                Ok(value)
            }
            Err(err) => {
                self.state = scope.base;
                Err(err)
            }
        }
    }

    /// Record one operation: apply it to state, then buffer it.
    ///
    /// Outside a transaction this is the auto-wrap path: on apply failure
    /// the state is left at its pre-op snapshot and the error re-raised.
    pub(crate) fn record(&mut self, op: Operation) -> Result<()> {
        let next = self.schema.apply_operation(self.state.clone(), &op)?;
        self.state = next;
        match &mut self.scope {
            Some(scope) => scope.ops.push(op),
            None => self.pending.push(op),
        }
        Ok(())
    }

    /// Apply externally-received operations without touching the pending
    /// buffer. The batch is atomic: any failure restores the prior state.
    pub fn apply(&mut self, ops: &[Operation]) -> Result<()> {
        let base = self.state.clone();
        for op in ops {
            match self.schema.apply_operation(self.state.take(), op) {
                Ok(next) => self.state = next,
                Err(err) => {
                    self.state = base;
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Reconcile against a server-ordered transaction: transform every
    /// buffered op against the incoming ops (dropping the ones the server
    /// made moot), then apply the server ops to state.
    pub fn integrate(&mut self, tx: &Transaction) -> Result<()> {
        let mut pending = std::mem::take(&mut self.pending);
        for server_op in &tx.ops {
            pending = pending
                .into_iter()
                .filter_map(|client_op| {
                    match transform::transform_operation(&client_op, server_op) {
                        TransformResult::Transformed(op) => Some(op),
                        TransformResult::Noop => None,
                        TransformResult::Conflict(reason) => {
                            tracing::warn!(%reason, "dropping conflicting buffered op");
                            None
                        }
                    }
                })
                .collect();
        }
        self.pending = pending;
        self.apply(&tx.ops)
    }

    /// Bundle the pending buffer into a transaction, deduplicating
    /// consecutive same-path set ops. Returns `None` when nothing is
    /// buffered; fails inside an open transaction scope.
    pub fn flush(&mut self) -> Result<Option<Transaction>> {
        if self.scope.is_some() {
            return Err(TransactionError::InTransaction.into());
        }
        let ops = deduplicate_ops(std::mem::take(&mut self.pending));
        if ops.is_empty() {
            return Ok(None);
        }
        Ok(Some(Transaction::new(ops)))
    }

    /// Resolve the primitive the given path addresses, consulting state
    /// where the schema alone cannot decide (tree node types, active union
    /// variants).
    pub(crate) fn primitive_at(&self, path: &OperationPath) -> Result<Primitive> {
        use crate::schema::PrimitiveKind;

        let mut primitive: Primitive = (*self.schema).clone();
        let mut state: Option<&Value> = self.state.as_ref();
        let mut index = 0;
        while index < path.len() {
            let token = path.token(index).expect("bounded by len");
            primitive = match primitive.resolve().kind() {
                PrimitiveKind::Struct(s) => {
                    let next = s
                        .field(token)
                        .ok_or_else(|| crate::core::error::SchemaError::UnknownField(token.to_string()))?
                        .clone();
                    state = state.and_then(|v| v.as_object()).and_then(|o| o.get(token));
                    index += 1;
                    next
                }
                PrimitiveKind::Array(element) => {
                    let entry = state
                        .and_then(|v| v.as_entries())
                        .and_then(|entries| entries.iter().find(|e| e.id == *token));
                    state = entry.and_then(|e| e.value.as_ref());
                    index += 1;
                    (**element).clone()
                }
                PrimitiveKind::Union(u) => {
                    let tag = state
                        .and_then(|v| v.as_object())
                        .and_then(|o| o.get(u.discriminator()))
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            crate::core::error::SchemaError::InvalidPayload(
                                "union has no active variant".to_string(),
                            )
                        })?;
                    // The variant consumes the token itself on the next pass
                    u.variant(tag)
                        .ok_or_else(|| {
                            crate::core::error::SchemaError::InvalidPayload(format!(
                                "unknown union variant '{}'",
                                tag
                            ))
                        })?
                        .clone()
                }
                PrimitiveKind::Tree(t) => {
                    let node = state
                        .and_then(|v| v.as_nodes())
                        .and_then(|nodes| nodes.iter().find(|n| n.id == *token))
                        .ok_or_else(|| {
                            crate::core::error::SchemaError::UnknownNode(token.to_string())
                        })?;
                    let data = t
                        .node_type(&node.node_type)
                        .ok_or_else(|| {
                            crate::core::error::SchemaError::TreeInvariant(format!(
                                "unknown node type '{}'",
                                node.node_type
                            ))
                        })?
                        .data
                        .clone();
                    state = node.data.as_ref();
                    index += 1;
                    data
                }
                _ => {
                    return Err(Error::Schema(crate::core::error::SchemaError::PathTooDeep(
                        primitive.kind_name(),
                    )))
                }
            };
        }
        Ok(primitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::OpKind;
    use crate::schema::{number, string, struct_of};
    use serde_json::json;

    fn doc() -> Document {
        Document::new(struct_of(vec![
            ("title", string().default_value("")),
            ("count", number().default_value(0i64)),
        ]))
    }

    #[test]
    fn test_mutation_outside_transaction_buffers_and_applies() {
        let mut doc = doc();
        doc.root().at("title").set(json!("Hello")).unwrap();
        assert_eq!(
            doc.get(&["title".to_string()]).and_then(Value::as_str),
            Some("Hello")
        );
        assert_eq!(doc.pending_len(), 1);
    }

    #[test]
    fn test_failed_mutation_leaves_state_untouched() {
        let mut doc = doc();
        doc.root().at("title").set(json!("keep")).unwrap();
        assert!(doc.root().at("title").set(json!(42)).is_err());
        assert_eq!(
            doc.get(&["title".to_string()]).and_then(Value::as_str),
            Some("keep")
        );
        assert_eq!(doc.pending_len(), 1);
    }

    #[test]
    fn test_transaction_is_atomic() {
        let mut doc = doc();
        let result: Result<()> = doc.transaction(|d| {
            d.root().at("title").set(json!("inside"))?;
            // reads observe intermediate effects
            assert_eq!(
                d.get(&["title".to_string()]).and_then(Value::as_str),
                Some("inside")
            );
            d.root().at("count").set(json!("not a number"))?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(
            doc.get(&["title".to_string()]).and_then(Value::as_str),
            Some("")
        );
        assert_eq!(doc.pending_len(), 0);
    }

    #[test]
    fn test_transaction_success_buffers_ops() {
        let mut doc = doc();
        let n = doc
            .transaction(|d| {
                d.root().at("title").set(json!("a"))?;
                d.root().at("count").set(json!(2))?;
                Ok(2)
            })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(doc.pending_len(), 2);
    }

    #[test]
    fn test_nested_transactions_forbidden() {
        let mut doc = doc();
        let result: Result<()> = doc.transaction(|d| d.transaction(|_| Ok(())));
        assert!(matches!(
            result,
            Err(Error::Transaction(TransactionError::Nested))
        ));
    }

    #[test]
    fn test_flush_deduplicates_and_clears() {
        let mut doc = doc();
        doc.root().at("title").set(json!("a")).unwrap();
        doc.root().at("title").set(json!("b")).unwrap();
        let tx = doc.flush().unwrap().unwrap();
        assert_eq!(tx.ops.len(), 1);
        assert_eq!(tx.ops[0].payload, json!("b"));
        assert_eq!(doc.pending_len(), 0);
        assert!(doc.flush().unwrap().is_none());
    }

    #[test]
    fn test_apply_does_not_touch_pending() {
        let mut doc = doc();
        doc.root().at("title").set(json!("local")).unwrap();
        let remote = Operation::new(
            OpKind::NumberSet,
            OperationPath::from_tokens(["count"]),
            json!(7),
        );
        doc.apply(&[remote]).unwrap();
        assert_eq!(doc.pending_len(), 1);
        assert_eq!(
            doc.get(&["count".to_string()]).and_then(Value::as_number),
            Some(7.0)
        );
    }

    #[test]
    fn test_apply_batch_rolls_back() {
        let mut doc = doc();
        let good = Operation::new(
            OpKind::NumberSet,
            OperationPath::from_tokens(["count"]),
            json!(7),
        );
        let bad = Operation::new(
            OpKind::NumberSet,
            OperationPath::from_tokens(["count"]),
            json!("x"),
        );
        assert!(doc.apply(&[good, bad]).is_err());
        assert_eq!(
            doc.get(&["count".to_string()]).and_then(Value::as_number),
            Some(0.0)
        );
    }
}
