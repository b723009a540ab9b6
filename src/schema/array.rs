//! Ordered keyed array primitive
//!
//! Array state is a list of `{id, pos, value}` entries whose visual order
//! is always the lexicographic order of `pos` (ties broken by id). The
//! caller constructs ids and fractional positions; the schema validates
//! shape and uniqueness. Nested operations address elements by id.

use crate::core::error::SchemaError;
use crate::core::operation::{OpKind, Operation};
use crate::schema::value::{sort_entries, ArrayEntry};
use crate::schema::{Primitive, Result, Value};
use serde_json::Value as Json;

/// Decode an `array.set` payload: the full entries list
pub(crate) fn decode(element: &Primitive, json: &Json) -> Result<Value> {
    let items = json
        .as_array()
        .ok_or_else(|| SchemaError::InvalidPayload(format!("expected array, got {}", json)))?;

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        entries.push(decode_entry(element, item)?);
    }
    for (i, entry) in entries.iter().enumerate() {
        if entries[..i].iter().any(|e| e.id == entry.id) {
            return Err(SchemaError::InvalidPayload(format!(
                "duplicate array element id '{}'",
                entry.id
            )));
        }
    }
    sort_entries(&mut entries);
    Ok(Value::Entries(entries))
}

/// Decode one `{id, pos, value}` entry object
fn decode_entry(element: &Primitive, json: &Json) -> Result<ArrayEntry> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaError::InvalidPayload(format!("expected entry object, got {}", json)))?;
    let id = require_id(obj.get("id"))?;
    let pos = require_pos(obj.get("pos"))?;
    let value = match obj.get("value").filter(|v| !v.is_null()) {
        Some(v) => Some(element.decode_value(v)?),
        None => element.initial_state(),
    };
    Ok(ArrayEntry { id, pos, value })
}

/// Apply `array.insert` / `array.remove` / `array.move`
pub(crate) fn apply_structural(
    element: &Primitive,
    state: Option<Value>,
    op: &Operation,
) -> Result<Value> {
    let mut entries = match state {
        Some(Value::Entries(entries)) => entries,
        None => Vec::new(),
        Some(other) => {
            return Err(SchemaError::InvalidPayload(format!(
                "expected array state, got {:?}",
                other
            )))
        }
    };

    match op.kind {
        OpKind::ArrayInsert => {
            let entry = decode_entry(element, &op.payload)?;
            if entries.iter().any(|e| e.id == entry.id) {
                return Err(SchemaError::InvalidPayload(format!(
                    "duplicate array element id '{}'",
                    entry.id
                )));
            }
            entries.push(entry);
            sort_entries(&mut entries);
        }
        OpKind::ArrayRemove => {
            let id = payload_id(&op.payload)?;
            let index = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(SchemaError::UnknownElement(id))?;
            entries.remove(index);
        }
        OpKind::ArrayMove => {
            let id = payload_id(&op.payload)?;
            let pos = require_pos(op.payload.get("pos"))?;
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(SchemaError::UnknownElement(id))?;
            entry.pos = pos;
            sort_entries(&mut entries);
        }
        _ => unreachable!("caller matched structural kinds"),
    }
    Ok(Value::Entries(entries))
}

/// Delegate a nested operation to the element addressed by id
pub(crate) fn descend(
    element: &Primitive,
    state: Option<Value>,
    op: &Operation,
    depth: usize,
) -> Result<Option<Value>> {
    let id = op.path.token(depth).expect("caller checked depth");
    let mut entries = match state {
        Some(Value::Entries(entries)) => entries,
        _ => return Err(SchemaError::UnknownElement(id.to_string())),
    };

    let entry = entries
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or_else(|| SchemaError::UnknownElement(id.to_string()))?;
    entry.value = element.apply_at(entry.value.take(), op, depth + 1)?;
    Ok(Some(Value::Entries(entries)))
}

/// Extract the `id` field of a structural payload
pub(crate) fn payload_id(payload: &Json) -> Result<String> {
    require_id(payload.get("id"))
}

fn require_id(value: Option<&Json>) -> Result<String> {
    value
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SchemaError::InvalidPayload("missing element id".to_string()))
}

fn require_pos(value: Option<&Json>) -> Result<String> {
    value
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SchemaError::InvalidPayload("missing position key".to_string()))
}
