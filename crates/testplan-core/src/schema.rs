//! Collaborator seams and schema-directed type resolution.
//!
//! The core orchestrates four external collaborators — the schema type
//! directory, the capability gate, the constraint evaluator and the value
//! normalizer — but implements none of their internals. Each is a trait
//! here; the step compiler and the response validator only ever see the
//! trait objects.

use std::collections::BTreeMap;
use testplan_types::{Result, Value};

// ─────────────────────────────────────────────────────────────────────
// Schema type directory
// ─────────────────────────────────────────────────────────────────────

/// Signature of a cluster attribute as known to the schema directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSignature {
    /// Name of the attribute's data type.
    pub data_type: String,
}

/// Signature of a cluster command: its input and output type names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSignature {
    pub input_type: Option<String>,
    pub output_type: Option<String>,
}

/// A named field inside a structured schema type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    pub name: String,
    pub type_name: String,
}

/// A named type as stored in the schema directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaType {
    /// A scalar with a primitive base type (enums, bitmaps, named scalars).
    Scalar { base_type: String },
    /// A structured type with named fields.
    Struct { fields: Vec<FieldType> },
}

/// The cluster/attribute/command schema directory.
pub trait SchemaDirectory {
    /// Look up an attribute by cluster and attribute name.
    fn attribute_by_name(&self, cluster: &str, name: &str) -> Option<AttributeSignature>;
    /// Look up a command by cluster and command name.
    fn command_by_name(&self, cluster: &str, name: &str) -> Option<CommandSignature>;
    /// Look up a named type within a cluster's scope.
    fn type_by_name(&self, cluster: &str, type_name: &str) -> Option<SchemaType>;
}

// ─────────────────────────────────────────────────────────────────────
// TypeMapping
// ─────────────────────────────────────────────────────────────────────

/// Schema-resolved shape of an argument or response type.
///
/// Consumed exhaustively: every site that looks at a mapping matches all
/// three variants.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeMapping {
    /// No schema information; values pass through untouched.
    Unknown,
    /// A primitive leaf type, lowercased.
    Leaf(String),
    /// A structured type: field name → mapping.
    Structured(BTreeMap<String, TypeMapping>),
}

impl TypeMapping {
    /// Resolve a type name by recursive descent through the directory.
    ///
    /// A scalar becomes `Leaf` of its lowercased base type; a struct
    /// becomes `Structured` over its recursively resolved fields. A name
    /// the directory does not know becomes `Leaf` of the lowercased name
    /// itself — primitive names such as `int64u` are not directory
    /// entries. An absent or empty name yields `Unknown`.
    pub fn resolve(
        schema: &dyn SchemaDirectory,
        cluster: &str,
        type_name: Option<&str>,
    ) -> TypeMapping {
        let Some(name) = type_name else {
            return TypeMapping::Unknown;
        };
        if name.is_empty() {
            return TypeMapping::Unknown;
        }
        match schema.type_by_name(cluster, name) {
            Some(SchemaType::Scalar { base_type }) => TypeMapping::Leaf(base_type.to_lowercase()),
            Some(SchemaType::Struct { fields }) => TypeMapping::Structured(
                fields
                    .into_iter()
                    .map(|f| {
                        let mapping = Self::resolve(schema, cluster, Some(&f.type_name));
                        (f.name, mapping)
                    })
                    .collect(),
            ),
            None => TypeMapping::Leaf(name.to_lowercase()),
        }
    }

    /// Returns `true` if no schema information is available.
    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeMapping::Unknown)
    }

    /// The mapping of a named field, for structured mappings.
    pub fn field(&self, name: &str) -> Option<&TypeMapping> {
        match self {
            TypeMapping::Structured(fields) => fields.get(name),
            TypeMapping::Unknown | TypeMapping::Leaf(_) => None,
        }
    }

    /// The leaf type name, if this mapping is a leaf.
    pub fn leaf_name(&self) -> Option<&str> {
        match self {
            TypeMapping::Leaf(name) => Some(name),
            TypeMapping::Unknown | TypeMapping::Structured(_) => None,
        }
    }

    /// Known field names, for structured mappings.
    pub fn field_names(&self) -> Vec<String> {
        match self {
            TypeMapping::Structured(fields) => fields.keys().cloned().collect(),
            TypeMapping::Unknown | TypeMapping::Leaf(_) => Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Capability gate
// ─────────────────────────────────────────────────────────────────────

/// Evaluates capability-gate (feature-presence) expressions.
pub trait CapabilityGate {
    /// Evaluate a gate expression. `None` means ungated and must be true.
    fn check(&self, expr: Option<&str>) -> bool;
}

// ─────────────────────────────────────────────────────────────────────
// Constraint evaluator
// ─────────────────────────────────────────────────────────────────────

/// A single declarative predicate over a received value.
pub trait Constraint {
    /// Whether the constraint holds for `value`, given the declared leaf
    /// type name of the target field (if any).
    fn is_met(&self, value: Option<&Value>, type_name: Option<&str>) -> bool;
}

/// Parses constraint blocks into predicate objects.
pub trait ConstraintParser {
    /// Parse a constraints block. Syntax errors are fail-fast compilation
    /// errors — the same path runs eagerly at compile time and again at
    /// validation time.
    fn parse(&self, block: &BTreeMap<String, Value>) -> Result<Vec<Box<dyn Constraint>>>;

    /// Whether the named constraint's operand depends on the target
    /// field's declared type (and is therefore normalized like a value).
    fn is_typed_constraint(&self, name: &str) -> bool;
}

// ─────────────────────────────────────────────────────────────────────
// Value normalizer
// ─────────────────────────────────────────────────────────────────────

/// Pure fixups for serialization artifacts in document values.
///
/// Each method returns its input unchanged when the fixup does not apply.
pub trait ValueNormalizer {
    /// Restore integer precision lost by a lossy document loader
    /// (64-bit integers parsed through a float path).
    fn fix_integer_precision(&self, value: Value) -> Value;

    /// Rewrite integer literals some document producers cannot represent
    /// exactly.
    fn fix_unrepresentable_literal(&self, value: Value) -> Value;

    /// Interpret a float that was written as a string literal.
    fn fix_float_literal_string(&self, value: Value) -> Value;

    /// Narrow a float carried on an integer leaf to an integer.
    fn float_to_integer(&self, value: Value) -> Value;

    /// Decode an octet-string literal into raw bytes.
    fn decode_octet_string(&self, value: Value) -> Result<Value>;
}
