//! Scalar primitives: string, number, boolean, literal, either
//!
//! Also home to the refinement validators users attach to scalars.

use crate::core::error::SchemaError;
use crate::schema::{Primitive, PrimitiveKind, Result, Value};
use regex::Regex;
use serde_json::Value as Json;

/// A user-declared predicate over a decoded scalar value.
///
/// Refinements only inspect values of their own type; a mismatched value is
/// somebody else's validation failure.
#[derive(Clone, Debug)]
pub enum Refinement {
    /// Number must be `>= bound`
    MinNumber(f64),
    /// Number must be `<= bound`
    MaxNumber(f64),
    /// Number must have no fractional part
    Integer,
    /// String must have at least this many characters
    MinLength(usize),
    /// String must have at most this many characters
    MaxLength(usize),
    /// String must match the pattern
    Pattern(Regex),
}

impl Refinement {
    /// Compile a pattern refinement
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Refinement::Pattern)
            .map_err(|e| SchemaError::InvalidSchema(format!("bad pattern: {}", e)))
    }

    /// Check a decoded value, failing with the refinement's description
    pub fn check(&self, value: &Value) -> Result<()> {
        let fail = |msg: String| Err(SchemaError::Refinement(msg));
        match (self, value) {
            (Refinement::MinNumber(min), Value::Number(n)) if n < min => {
                fail(format!("{} is below minimum {}", n, min))
            }
            (Refinement::MaxNumber(max), Value::Number(n)) if n > max => {
                fail(format!("{} is above maximum {}", n, max))
            }
            (Refinement::Integer, Value::Number(n)) if n.fract() != 0.0 => {
                fail(format!("{} is not an integer", n))
            }
            (Refinement::MinLength(min), Value::String(s)) if s.chars().count() < *min => {
                fail(format!("length {} is below minimum {}", s.chars().count(), min))
            }
            (Refinement::MaxLength(max), Value::String(s)) if s.chars().count() > *max => {
                fail(format!("length {} is above maximum {}", s.chars().count(), max))
            }
            (Refinement::Pattern(re), Value::String(s)) if !re.is_match(s) => {
                fail(format!("'{}' does not match /{}/", s, re.as_str()))
            }
            _ => Ok(()),
        }
    }
}

/// Decode a JSON payload against a scalar primitive
pub(crate) fn decode(primitive: &Primitive, json: &Json) -> Result<Value> {
    match &primitive.kind {
        PrimitiveKind::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| SchemaError::InvalidPayload(format!("expected string, got {}", json))),
        PrimitiveKind::Number => json
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Value::Number)
            .ok_or_else(|| SchemaError::InvalidPayload(format!("expected number, got {}", json))),
        PrimitiveKind::Boolean => json
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| SchemaError::InvalidPayload(format!("expected boolean, got {}", json))),
        PrimitiveKind::Literal(expected) => {
            let value = decode_plain_scalar(json)?;
            if &value == expected {
                Ok(value)
            } else {
                Err(SchemaError::InvalidPayload(format!(
                    "expected literal {:?}, got {}",
                    expected, json
                )))
            }
        }
        PrimitiveKind::Either(variants) => decode_either(variants, json),
        _ => Err(SchemaError::InvalidSchema(format!(
            "{} is not a scalar",
            primitive.kind_name()
        ))),
    }
}

/// Decode against each variant, literal variants first; the first match
/// wins and its refinements run.
fn decode_either(variants: &[Primitive], json: &Json) -> Result<Value> {
    let literal_first = variants
        .iter()
        .filter(|v| matches!(v.kind, PrimitiveKind::Literal(_)))
        .chain(variants.iter().filter(|v| !matches!(v.kind, PrimitiveKind::Literal(_))));
    for variant in literal_first {
        if let Ok(value) = variant.decode_value(json) {
            return Ok(value);
        }
    }
    Err(SchemaError::InvalidPayload(format!(
        "{} matches no either variant",
        json
    )))
}

/// Decode a plain scalar JSON value without a schema expectation
fn decode_plain_scalar(json: &Json) -> Result<Value> {
    match json {
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => n
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Value::Number)
            .ok_or_else(|| SchemaError::InvalidPayload("non-finite number".to_string())),
        Json::String(s) => Ok(Value::String(s.clone())),
        other => Err(SchemaError::InvalidPayload(format!(
            "expected scalar, got {}",
            other
        ))),
    }
}

/// Construction-time validation for `either`: scalar variants only, and no
/// literal/typed collisions that would make matching ambiguous.
pub(crate) fn validate_either(variants: &[Primitive]) -> Result<()> {
    if variants.is_empty() {
        return Err(SchemaError::InvalidSchema(
            "either needs at least one variant".to_string(),
        ));
    }
    for variant in variants {
        if !matches!(
            variant.kind,
            PrimitiveKind::String
                | PrimitiveKind::Number
                | PrimitiveKind::Boolean
                | PrimitiveKind::Literal(_)
        ) {
            return Err(SchemaError::InvalidSchema(format!(
                "either variants must be scalars, got {}",
                variant.kind_name()
            )));
        }
    }

    // A literal collides with a typed variant of the same base type, and
    // duplicate shapes collide with each other.
    for (i, a) in variants.iter().enumerate() {
        for b in variants.iter().skip(i + 1) {
            let clash = match (&a.kind, &b.kind) {
                (PrimitiveKind::Literal(x), PrimitiveKind::Literal(y)) => x == y,
                (PrimitiveKind::Literal(l), other) | (other, PrimitiveKind::Literal(l)) => {
                    literal_matches_base(l, other)
                }
                (x, y) => std::mem::discriminant(x) == std::mem::discriminant(y),
            };
            if clash {
                return Err(SchemaError::AmbiguousEither(format!(
                    "variant {} collides with {}",
                    a.kind_name(),
                    b.kind_name()
                )));
            }
        }
    }
    Ok(())
}

fn literal_matches_base(literal: &Value, base: &PrimitiveKind) -> bool {
    matches!(
        (literal, base),
        (Value::String(_), PrimitiveKind::String)
            | (Value::Number(_), PrimitiveKind::Number)
            | (Value::Bool(_), PrimitiveKind::Boolean)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{boolean, either, literal, number, string};
    use serde_json::json;

    #[test]
    fn test_scalar_decoding() {
        assert_eq!(string().decode_value(&json!("hi")).unwrap(), Value::String("hi".into()));
        assert_eq!(number().decode_value(&json!(2)).unwrap(), Value::Number(2.0));
        assert_eq!(boolean().decode_value(&json!(true)).unwrap(), Value::Bool(true));
        assert!(string().decode_value(&json!(1)).is_err());
        assert!(number().decode_value(&json!("1")).is_err());
    }

    #[test]
    fn test_literal_must_match() {
        let lit = literal("active");
        assert!(lit.decode_value(&json!("active")).is_ok());
        assert!(lit.decode_value(&json!("idle")).is_err());
    }

    #[test]
    fn test_refinements_run_in_order() {
        let age = number().refine(Refinement::MinNumber(0.0)).refine(Refinement::Integer);
        assert!(age.decode_value(&json!(30)).is_ok());
        assert!(matches!(
            age.decode_value(&json!(-1)),
            Err(SchemaError::Refinement(_))
        ));
        assert!(age.decode_value(&json!(1.5)).is_err());
    }

    #[test]
    fn test_string_refinements() {
        let name = string()
            .refine(Refinement::MinLength(1))
            .refine(Refinement::MaxLength(8))
            .refine(Refinement::pattern("^[a-z]+$").unwrap());
        assert!(name.decode_value(&json!("abc")).is_ok());
        assert!(name.decode_value(&json!("")).is_err());
        assert!(name.decode_value(&json!("waytoolongforthis")).is_err());
        assert!(name.decode_value(&json!("ABC")).is_err());
    }

    #[test]
    fn test_either_matches_one_variant() {
        let e = either(vec![literal("auto"), number()]).unwrap();
        assert_eq!(e.decode_value(&json!("auto")).unwrap(), Value::String("auto".into()));
        assert_eq!(e.decode_value(&json!(4)).unwrap(), Value::Number(4.0));
        assert!(e.decode_value(&json!("manual")).is_err());
        assert!(e.decode_value(&json!([1])).is_err());
    }

    #[test]
    fn test_either_collisions_rejected_at_construction() {
        assert!(matches!(
            either(vec![number(), literal(0i64)]),
            Err(SchemaError::AmbiguousEither(_))
        ));
        assert!(either(vec![number(), number()]).is_err());
        assert!(either(vec![literal("a"), literal("a")]).is_err());
        assert!(either(vec![literal("a"), literal("b"), number()]).is_ok());
        assert!(either(vec![]).is_err());
    }

    #[test]
    fn test_either_variant_refinements_run() {
        let e = either(vec![literal("none"), number().refine(Refinement::MinNumber(1.0))]).unwrap();
        assert!(e.decode_value(&json!(0)).is_err());
        assert!(e.decode_value(&json!(3)).is_ok());
    }
}
