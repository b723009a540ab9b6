//! Schema algebra for document state
//!
//! A schema is a tree of [`Primitive`] descriptors. Every primitive
//! provides four pure capabilities: produce an initial state, interpret an
//! operation against a state value ([`Primitive::apply_operation`]),
//! decode/validate a JSON payload into typed state
//! ([`Primitive::decode_value`]), and transform a client operation against
//! a concurrent server operation ([`Primitive::transform_operation`]).
//!
//! The user-facing mutation surface lives in [`crate::client`], which walks
//! this descriptor tree with typed cursors instead of runtime reflection.

/// Document state values
pub mod value;

/// Scalar primitives and refinements
pub mod scalar;
/// Struct primitive and defaults propagation
pub mod strukt;
/// Ordered keyed array primitive
pub mod array;
/// Tagged union primitive
pub mod union;
/// Ordered tree primitive
pub mod tree;
/// Operational transformation rules
pub mod transform;

pub use scalar::Refinement;
pub use transform::TransformResult;
pub use tree::{TreeChild, TreeNodeDef, TreeNodeSchema, TreeSchema};
pub use value::{ArrayEntry, TreeNode, Value};

use crate::core::error::SchemaError;
use crate::core::operation::{OpKind, Operation};
use once_cell::sync::OnceCell;
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// Result alias for schema construction and operation application
pub type Result<T> = std::result::Result<T, SchemaError>;

/// One descriptor in the schema tree
#[derive(Clone)]
pub struct Primitive {
    pub(crate) required: bool,
    pub(crate) default: Option<Value>,
    pub(crate) refinements: Vec<Refinement>,
    pub(crate) kind: PrimitiveKind,
}

/// The closed set of primitive shapes
#[derive(Clone)]
pub enum PrimitiveKind {
    /// UTF-8 string scalar
    String,
    /// Finite numeric scalar
    Number,
    /// Boolean scalar
    Boolean,
    /// A single fixed scalar value
    Literal(Value),
    /// Union of scalar variants; literal variants match first
    Either(Vec<Primitive>),
    /// Ordered field map
    Struct(StructSchema),
    /// Ordered collection keyed by element id, positioned by fractional keys
    Array(Box<Primitive>),
    /// Tagged variant union discriminated by a field
    Union(UnionSchema),
    /// Ordered tree with parent references
    Tree(TreeSchema),
    /// Recursive thunk, resolved once and memoized
    Lazy(LazySchema),
}

/// Declared fields of a struct, in declaration order
#[derive(Clone)]
pub struct StructSchema {
    pub(crate) fields: Vec<(String, Primitive)>,
}

impl StructSchema {
    /// Look up a field descriptor by name
    pub fn field(&self, name: &str) -> Option<&Primitive> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }
}

/// Declared variants of a tagged union
#[derive(Clone)]
pub struct UnionSchema {
    pub(crate) discriminator: String,
    pub(crate) variants: Vec<(String, Primitive)>,
}

impl UnionSchema {
    /// The discriminator field name (default `"type"`)
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Look up a variant by its discriminator value
    pub fn variant(&self, name: &str) -> Option<&Primitive> {
        self.variants.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }
}

/// A memoized recursive schema thunk
#[derive(Clone)]
pub struct LazySchema {
    thunk: Arc<dyn Fn() -> Primitive + Send + Sync>,
    resolved: Arc<OnceCell<Primitive>>,
}

impl LazySchema {
    /// Resolve the body, memoizing on first use
    pub fn resolved(&self) -> &Primitive {
        self.resolved.get_or_init(|| (self.thunk)())
    }
}

impl fmt::Debug for LazySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lazy(..)")
    }
}

// ----- constructors -----

/// String scalar
pub fn string() -> Primitive {
    Primitive::of(PrimitiveKind::String)
}

/// Finite number scalar
pub fn number() -> Primitive {
    Primitive::of(PrimitiveKind::Number)
}

/// Boolean scalar
pub fn boolean() -> Primitive {
    Primitive::of(PrimitiveKind::Boolean)
}

/// A literal scalar: only the given value is accepted
pub fn literal(value: impl Into<Value>) -> Primitive {
    Primitive::of(PrimitiveKind::Literal(value.into()))
}

/// Scalar union. Variants must be scalars, and a literal variant may not
/// collide with a typed variant of the same base type.
pub fn either(variants: Vec<Primitive>) -> Result<Primitive> {
    scalar::validate_either(&variants)?;
    Ok(Primitive::of(PrimitiveKind::Either(variants)))
}

/// Struct with declared fields in order
pub fn struct_of<S: Into<String>>(fields: Vec<(S, Primitive)>) -> Primitive {
    Primitive::of(PrimitiveKind::Struct(StructSchema {
        fields: fields.into_iter().map(|(n, p)| (n.into(), p)).collect(),
    }))
}

/// Ordered keyed array of `element`
pub fn array_of(element: Primitive) -> Primitive {
    Primitive::of(PrimitiveKind::Array(Box::new(element)))
}

/// Tagged union with the default `"type"` discriminator
pub fn union_of<S: Into<String>>(variants: Vec<(S, Primitive)>) -> Result<Primitive> {
    union_with_discriminator("type", variants)
}

/// Tagged union with an explicit discriminator field
pub fn union_with_discriminator<S: Into<String>>(
    discriminator: &str,
    variants: Vec<(S, Primitive)>,
) -> Result<Primitive> {
    let schema = UnionSchema {
        discriminator: discriminator.to_string(),
        variants: variants.into_iter().map(|(n, p)| (n.into(), p)).collect(),
    };
    union::validate_union(&schema)?;
    Ok(Primitive::of(PrimitiveKind::Union(schema)))
}

/// Ordered tree. `types` declares every node type; self references in
/// child lists are resolved to the owning type in a single fix-up pass.
pub fn tree<S: Into<String>>(root_type: &str, types: Vec<(S, TreeNodeDef)>) -> Result<Primitive> {
    let schema = tree::build_schema(root_type, types)?;
    Ok(Primitive::of(PrimitiveKind::Tree(schema)))
}

/// Recursive schema thunk; the body is built once on first use
pub fn lazy(f: impl Fn() -> Primitive + Send + Sync + 'static) -> Primitive {
    Primitive::of(PrimitiveKind::Lazy(LazySchema {
        thunk: Arc::new(f),
        resolved: Arc::new(OnceCell::new()),
    }))
}

impl Primitive {
    fn of(kind: PrimitiveKind) -> Self {
        Self {
            required: false,
            default: None,
            refinements: Vec::new(),
            kind,
        }
    }

    /// Mark this primitive as mandatory on wholesale `set`
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declare a default value, used by [`Primitive::initial_state`]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Attach a refinement validator; refinements run in declaration order
    pub fn refine(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }

    /// Borrow the descriptor kind
    pub fn kind(&self) -> &PrimitiveKind {
        &self.kind
    }

    /// Whether the primitive is mandatory on wholesale `set`
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Human name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            PrimitiveKind::String => "string",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Literal(_) => "literal",
            PrimitiveKind::Either(_) => "either",
            PrimitiveKind::Struct(_) => "struct",
            PrimitiveKind::Array(_) => "array",
            PrimitiveKind::Union(_) => "union",
            PrimitiveKind::Tree(_) => "tree",
            PrimitiveKind::Lazy(_) => "lazy",
        }
    }

    /// Resolve through any lazy indirection
    pub fn resolve(&self) -> &Primitive {
        match &self.kind {
            PrimitiveKind::Lazy(l) => l.resolved().resolve(),
            _ => self,
        }
    }

    /// Produce the initial state: the declared default, else a value derived
    /// from children with defaults, else undefined.
    pub fn initial_state(&self) -> Option<Value> {
        if let Some(default) = &self.default {
            return Some(default.clone());
        }
        match &self.kind {
            PrimitiveKind::Struct(s) => Some(strukt::initial_state(s)),
            PrimitiveKind::Tree(t) => Some(tree::initial_state(t)),
            PrimitiveKind::Lazy(l) => l.resolved().initial_state(),
            _ => None,
        }
    }

    /// Layer a partial value over defaults; recursive for structs only
    pub fn apply_defaults(&self, partial: Option<Value>) -> Option<Value> {
        match (&self.kind, partial) {
            (PrimitiveKind::Lazy(l), partial) => l.resolved().apply_defaults(partial),
            (PrimitiveKind::Struct(s), Some(Value::Object(obj))) => {
                Some(strukt::layer_defaults(s, obj))
            }
            (PrimitiveKind::Struct(_), None) => self.initial_state(),
            (_, partial) => partial,
        }
    }

    /// Decode and validate a JSON payload as a full state value for this
    /// primitive, applying refinements and struct defaults.
    pub fn decode_value(&self, json: &Json) -> Result<Value> {
        let value = match &self.kind {
            PrimitiveKind::String
            | PrimitiveKind::Number
            | PrimitiveKind::Boolean
            | PrimitiveKind::Literal(_)
            | PrimitiveKind::Either(_) => scalar::decode(self, json)?,
            PrimitiveKind::Struct(s) => strukt::decode(s, json)?,
            PrimitiveKind::Array(element) => array::decode(element, json)?,
            PrimitiveKind::Union(u) => union::decode(u, json)?,
            PrimitiveKind::Tree(t) => tree::decode(t, json)?,
            PrimitiveKind::Lazy(l) => return l.resolved().decode_value(json),
        };
        self.run_refinements(&value)?;
        Ok(value)
    }

    /// Decode persisted or snapshotted state; JSON null means undefined
    pub fn state_from_json(&self, json: &Json) -> Result<Option<Value>> {
        if json.is_null() {
            return Ok(None);
        }
        self.decode_value(json).map(Some)
    }

    /// Run this primitive's refinements against a decoded value
    pub(crate) fn run_refinements(&self, value: &Value) -> Result<()> {
        for refinement in &self.refinements {
            refinement.check(value)?;
        }
        Ok(())
    }

    /// Apply an operation to a state value, returning the new state.
    ///
    /// Pure: on error the caller's state is untouched.
    pub fn apply_operation(&self, state: Option<Value>, op: &Operation) -> Result<Option<Value>> {
        self.apply_at(state, op, 0)
    }

    pub(crate) fn apply_at(
        &self,
        state: Option<Value>,
        op: &Operation,
        depth: usize,
    ) -> Result<Option<Value>> {
        if let PrimitiveKind::Lazy(l) = &self.kind {
            return l.resolved().apply_at(state, op, depth);
        }
        if depth == op.path.len() {
            return self.apply_terminal(state, op);
        }
        match &self.kind {
            PrimitiveKind::Struct(s) => strukt::descend(self, s, state, op, depth),
            PrimitiveKind::Array(element) => array::descend(element, state, op, depth),
            PrimitiveKind::Union(u) => union::descend(u, state, op, depth),
            PrimitiveKind::Tree(t) => tree::descend(t, state, op, depth),
            _ => Err(SchemaError::PathTooDeep(self.kind_name())),
        }
    }

    fn apply_terminal(&self, state: Option<Value>, op: &Operation) -> Result<Option<Value>> {
        match (&self.kind, op.kind) {
            (PrimitiveKind::String, OpKind::StringSet)
            | (PrimitiveKind::Number, OpKind::NumberSet)
            | (PrimitiveKind::Boolean, OpKind::BooleanSet)
            | (PrimitiveKind::Literal(_), OpKind::LiteralSet)
            | (PrimitiveKind::Either(_), OpKind::EitherSet)
            | (PrimitiveKind::Struct(_), OpKind::StructSet)
            | (PrimitiveKind::Union(_), OpKind::UnionSet)
            | (PrimitiveKind::Array(_), OpKind::ArraySet)
            | (PrimitiveKind::Tree(_), OpKind::TreeSet) => {
                self.decode_value(&op.payload).map(Some)
            }
            (
                PrimitiveKind::Array(element),
                OpKind::ArrayInsert | OpKind::ArrayRemove | OpKind::ArrayMove,
            ) => array::apply_structural(element, state, op).map(Some),
            (
                PrimitiveKind::Tree(t),
                OpKind::TreeInsert | OpKind::TreeRemove | OpKind::TreeMove,
            ) => tree::apply_structural(t, state, op).map(Some),
            _ => Err(SchemaError::InvalidKind {
                kind: op.kind.wire_name().to_string(),
                primitive: self.kind_name(),
            }),
        }
    }

    /// Transform a client operation against a concurrent, already-applied
    /// server operation. See [`transform::transform_operation`].
    pub fn transform_operation(&self, client: &Operation, server: &Operation) -> TransformResult {
        transform::transform_operation(client, server)
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primitive({})", self.kind_name())
    }
}
