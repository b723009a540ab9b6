//! Struct primitive: ordered field map with defaults propagation
//!
//! `struct.set` replaces the whole value; nested operations consume one
//! path token (the field name) and delegate to the field's primitive.
//! Decoding is also where defaults propagate: the result starts from the
//! struct's initial state and layers the provided partial over it,
//! recursing into struct-valued fields.

use crate::core::error::SchemaError;
use crate::core::operation::Operation;
use crate::schema::{Primitive, Result, StructSchema, Value};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Initial state: every field's own initial state, undefined fields omitted
pub(crate) fn initial_state(schema: &StructSchema) -> Value {
    let mut fields = BTreeMap::new();
    for (name, field) in &schema.fields {
        if let Some(value) = field.initial_state() {
            fields.insert(name.clone(), value);
        }
    }
    Value::Object(fields)
}

/// Layer an already-decoded partial object over field defaults
pub(crate) fn layer_defaults(schema: &StructSchema, mut partial: BTreeMap<String, Value>) -> Value {
    let mut fields = BTreeMap::new();
    for (name, field) in &schema.fields {
        let value = match partial.remove(name) {
            Some(provided) => field.apply_defaults(Some(provided)),
            None => field.initial_state(),
        };
        if let Some(value) = value {
            fields.insert(name.clone(), value);
        }
    }
    Value::Object(fields)
}

/// Decode a `struct.set` payload: unknown fields error, required fields
/// without defaults are mandatory, everything else falls back to defaults.
pub(crate) fn decode(schema: &StructSchema, json: &Json) -> Result<Value> {
    let payload = json
        .as_object()
        .ok_or_else(|| SchemaError::InvalidPayload(format!("expected object, got {}", json)))?;

    for key in payload.keys() {
        if schema.field(key).is_none() {
            return Err(SchemaError::UnknownField(key.clone()));
        }
    }

    let mut fields = BTreeMap::new();
    for (name, field) in &schema.fields {
        let provided = payload.get(name).filter(|v| !v.is_null());
        match provided {
            Some(value) => {
                fields.insert(name.clone(), field.decode_value(value)?);
            }
            None => {
                if field.required && field.default.is_none() {
                    return Err(SchemaError::MissingRequired(name.clone()));
                }
                if let Some(value) = field.initial_state() {
                    fields.insert(name.clone(), value);
                }
            }
        }
    }
    Ok(Value::Object(fields))
}

/// Delegate a nested operation to the named field's primitive
pub(crate) fn descend(
    parent: &Primitive,
    schema: &StructSchema,
    state: Option<Value>,
    op: &Operation,
    depth: usize,
) -> Result<Option<Value>> {
    let token = op.path.token(depth).expect("caller checked depth").to_string();
    let field = schema
        .field(&token)
        .ok_or_else(|| SchemaError::UnknownField(token.clone()))?;

    // An undefined struct reads as its initial state for delegation
    let mut fields = match state {
        Some(Value::Object(fields)) => fields,
        Some(other) => {
            return Err(SchemaError::InvalidPayload(format!(
                "expected struct state, got {:?}",
                other
            )))
        }
        None => match parent.initial_state() {
            Some(Value::Object(fields)) => fields,
            _ => BTreeMap::new(),
        },
    };

    let current = fields.remove(&token);
    match field.apply_at(current, op, depth + 1)? {
        Some(new_value) => {
            fields.insert(token, new_value);
        }
        None => {}
    }
    Ok(Some(Value::Object(fields)))
}

#[cfg(test)]
mod tests {
    use crate::core::operation::{OpKind, Operation};
    use crate::core::path::OperationPath;
    use crate::core::error::SchemaError;
    use crate::schema::{number, string, struct_of, Value};
    use serde_json::json;

    fn op(kind: OpKind, path: &[&str], payload: serde_json::Value) -> Operation {
        Operation::new(kind, OperationPath::from_tokens(path.to_vec()), payload)
    }

    #[test]
    fn test_set_replaces_wholesale_with_defaults() {
        let schema = struct_of(vec![
            ("title", string().default_value("")),
            ("count", number().default_value(0i64)),
        ]);
        let state = schema
            .apply_operation(schema.initial_state(), &op(OpKind::StructSet, &[], json!({"title": "Hi"})))
            .unwrap()
            .unwrap();
        let obj = state.as_object().unwrap();
        assert_eq!(obj["title"], Value::String("Hi".into()));
        assert_eq!(obj["count"], Value::Number(0.0));
    }

    #[test]
    fn test_unknown_field_errors() {
        let schema = struct_of(vec![("title", string())]);
        let err = schema
            .apply_operation(schema.initial_state(), &op(OpKind::StructSet, &[], json!({"nope": 1})))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField(f) if f == "nope"));

        let err = schema
            .apply_operation(schema.initial_state(), &op(OpKind::StringSet, &["nope"], json!("x")))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField(_)));
    }

    #[test]
    fn test_required_without_default_is_mandatory() {
        let schema = struct_of(vec![("title", string().required()), ("count", number())]);
        let err = schema
            .apply_operation(None, &op(OpKind::StructSet, &[], json!({"count": 1})))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingRequired(f) if f == "title"));
        assert!(schema
            .apply_operation(None, &op(OpKind::StructSet, &[], json!({"title": "t"})))
            .is_ok());
    }

    #[test]
    fn test_nested_set_delegates_one_token() {
        let schema = struct_of(vec![
            ("title", string().default_value("")),
            ("meta", struct_of(vec![("stars", number().default_value(0i64))])),
        ]);
        let state = schema
            .apply_operation(
                schema.initial_state(),
                &op(OpKind::NumberSet, &["meta", "stars"], json!(4)),
            )
            .unwrap()
            .unwrap();
        let tokens: Vec<String> = ["meta", "stars"].map(String::from).into();
        assert_eq!(state.walk(&tokens).and_then(Value::as_number), Some(4.0));
        // Untouched siblings survive the nested apply
        assert_eq!(
            state.as_object().unwrap()["title"],
            Value::String(String::new())
        );
    }

    #[test]
    fn test_path_below_scalar_errors() {
        let schema = struct_of(vec![("title", string().default_value(""))]);
        let err = schema
            .apply_operation(
                schema.initial_state(),
                &op(OpKind::StringSet, &["title", "deeper"], json!("x")),
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::PathTooDeep("string")));
    }

    #[test]
    fn test_apply_is_deterministic() {
        let schema = struct_of(vec![("count", number().default_value(0i64))]);
        let operation = op(OpKind::NumberSet, &["count"], json!(9));
        let base = schema.initial_state();
        let a = schema.apply_operation(base.clone(), &operation).unwrap();
        let b = schema.apply_operation(base, &operation).unwrap();
        assert_eq!(a, b);
    }
}
