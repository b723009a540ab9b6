//! Tagged union primitive
//!
//! A union's state is the active variant's struct state with the
//! discriminator field layered in. `union.set` switches or re-seeds the
//! active variant; nested operations resolve the active variant from the
//! current state and delegate to it without consuming a path token.

use crate::core::error::SchemaError;
use crate::core::operation::Operation;
use crate::schema::{PrimitiveKind, Result, UnionSchema, Value};
use serde_json::Value as Json;

/// Construction-time validation: struct variants only, unique names, and
/// no variant may declare the discriminator field itself (the union owns
/// it and injects it into state).
pub(crate) fn validate_union(schema: &UnionSchema) -> Result<()> {
    if schema.variants.is_empty() {
        return Err(SchemaError::InvalidSchema(
            "union needs at least one variant".to_string(),
        ));
    }
    for (i, (name, variant)) in schema.variants.iter().enumerate() {
        if schema.variants[..i].iter().any(|(n, _)| n == name) {
            return Err(SchemaError::InvalidSchema(format!(
                "duplicate union variant '{}'",
                name
            )));
        }
        match &variant.kind {
            PrimitiveKind::Struct(s) => {
                if s.field(&schema.discriminator).is_some() {
                    return Err(SchemaError::InvalidSchema(format!(
                        "variant '{}' declares the discriminator field '{}'",
                        name, schema.discriminator
                    )));
                }
            }
            _ => {
                return Err(SchemaError::InvalidSchema(format!(
                    "union variant '{}' must be a struct, got {}",
                    name,
                    variant.kind_name()
                )))
            }
        }
    }
    Ok(())
}

/// Decode a `union.set` payload: the discriminator picks the variant, the
/// variant struct decodes the rest (applying its defaults), and the
/// discriminator is layered back into the resulting state.
pub(crate) fn decode(schema: &UnionSchema, json: &Json) -> Result<Value> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaError::InvalidPayload(format!("expected object, got {}", json)))?;
    let tag = obj
        .get(&schema.discriminator)
        .and_then(Json::as_str)
        .ok_or_else(|| {
            SchemaError::InvalidPayload(format!(
                "missing discriminator field '{}'",
                schema.discriminator
            ))
        })?;
    let variant = schema
        .variant(tag)
        .ok_or_else(|| SchemaError::InvalidPayload(format!("unknown union variant '{}'", tag)))?;

    let mut rest = obj.clone();
    rest.remove(&schema.discriminator);
    let decoded = variant.decode_value(&Json::Object(rest))?;

    match decoded {
        Value::Object(mut fields) => {
            fields.insert(schema.discriminator.clone(), Value::String(tag.to_string()));
            Ok(Value::Object(fields))
        }
        other => Err(SchemaError::InvalidPayload(format!(
            "union variant decoded to non-struct state {:?}",
            other
        ))),
    }
}

/// Resolve the active variant from state and delegate at the same depth
pub(crate) fn descend(
    schema: &UnionSchema,
    state: Option<Value>,
    op: &Operation,
    depth: usize,
) -> Result<Option<Value>> {
    let fields = match &state {
        Some(Value::Object(fields)) => fields,
        _ => {
            return Err(SchemaError::InvalidPayload(
                "union has no active variant".to_string(),
            ))
        }
    };
    let tag = fields
        .get(&schema.discriminator)
        .and_then(|v| v.as_str())
        .ok_or_else(|| SchemaError::InvalidPayload("union has no active variant".to_string()))?;
    let variant = schema
        .variant(tag)
        .ok_or_else(|| SchemaError::InvalidPayload(format!("unknown union variant '{}'", tag)))?
        .clone();

    // The variant is a struct over the same object state; it consumes the
    // next token as one of its field names.
    variant.apply_at(state, op, depth)
}
