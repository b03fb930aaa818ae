//! Shared collaborator doubles for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use testplan_core::{
    AttributeSignature, CapabilityGate, CommandSignature, Constraint, ConstraintParser, FieldType,
    PlanError, SchemaDirectory, SchemaType, TestPlan, TestPlanConfig, Value,
};

// ─────────────────────────────────────────────────────────────────
// Schema directory double
// ─────────────────────────────────────────────────────────────────

/// A small fixed schema: a "Basic" cluster and a "Test" cluster with one
/// command and a handful of typed attributes.
pub struct TestSchema {
    attributes: BTreeMap<(String, String), String>,
    commands: BTreeMap<(String, String), CommandSignature>,
    types: BTreeMap<String, SchemaType>,
}

impl TestSchema {
    pub fn new() -> Self {
        let mut attributes = BTreeMap::new();
        for (cluster, name, data_type) in [
            ("Basic", "ProductID", "int16u"),
            ("Test", "Counter", "int64u"),
            ("Test", "Ratio", "single"),
            ("Test", "Payload", "octet_string"),
            ("Test", "Flag", "boolean"),
            ("Test", "Nested", "SetTargetRequest"),
        ] {
            attributes.insert((cluster.to_string(), name.to_string()), data_type.to_string());
        }

        let mut commands = BTreeMap::new();
        commands.insert(
            ("Test".to_string(), "SetTarget".to_string()),
            CommandSignature {
                input_type: Some("SetTargetRequest".to_string()),
                output_type: Some("SetTargetResponse".to_string()),
            },
        );

        let mut types = BTreeMap::new();
        types.insert(
            "SetTargetRequest".to_string(),
            SchemaType::Struct {
                fields: vec![
                    FieldType {
                        name: "Target".into(),
                        type_name: "char_string".into(),
                    },
                    FieldType {
                        name: "Id".into(),
                        type_name: "int64u".into(),
                    },
                ],
            },
        );
        types.insert(
            "SetTargetResponse".to_string(),
            SchemaType::Struct {
                fields: vec![
                    FieldType {
                        name: "Status".into(),
                        type_name: "int8u".into(),
                    },
                    FieldType {
                        name: "Id".into(),
                        type_name: "int64u".into(),
                    },
                ],
            },
        );

        Self {
            attributes,
            commands,
            types,
        }
    }
}

impl SchemaDirectory for TestSchema {
    fn attribute_by_name(&self, cluster: &str, name: &str) -> Option<AttributeSignature> {
        self.attributes
            .get(&(cluster.to_string(), name.to_string()))
            .map(|data_type| AttributeSignature {
                data_type: data_type.clone(),
            })
    }

    fn command_by_name(&self, cluster: &str, name: &str) -> Option<CommandSignature> {
        self.commands
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
    }

    fn type_by_name(&self, _cluster: &str, type_name: &str) -> Option<SchemaType> {
        self.types.get(type_name).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────
// Capability gate doubles
// ─────────────────────────────────────────────────────────────────

/// Gate that passes everything.
pub struct PassingGate;

impl CapabilityGate for PassingGate {
    fn check(&self, _expr: Option<&str>) -> bool {
        true
    }
}

/// Gate that passes only the named capabilities (and ungated steps).
pub struct SetGate {
    pub enabled: BTreeSet<String>,
}

impl CapabilityGate for SetGate {
    fn check(&self, expr: Option<&str>) -> bool {
        match expr {
            None => true,
            Some(name) => self.enabled.contains(name),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Constraint evaluator double
// ─────────────────────────────────────────────────────────────────

/// Minimal constraint parser: `minValue`, `maxValue`, `notValue`,
/// `hasValue` and `type`. Anything else is a syntax error.
pub struct SimpleConstraints;

impl ConstraintParser for SimpleConstraints {
    fn parse(
        &self,
        block: &BTreeMap<String, Value>,
    ) -> testplan_core::Result<Vec<Box<dyn Constraint>>> {
        let mut predicates: Vec<Box<dyn Constraint>> = Vec::new();
        for (name, operand) in block {
            match name.as_str() {
                "minValue" => predicates.push(Box::new(MinValue(operand.clone()))),
                "maxValue" => predicates.push(Box::new(MaxValue(operand.clone()))),
                "notValue" => predicates.push(Box::new(NotValue(operand.clone()))),
                "hasValue" => predicates.push(Box::new(HasValue(operand.is_truthy()))),
                "type" => predicates.push(Box::new(TypeIs(
                    operand.as_str().unwrap_or_default().to_string(),
                ))),
                other => {
                    return Err(PlanError::ConstraintSyntax(format!(
                        "unknown constraint: {other}"
                    )))
                }
            }
        }
        Ok(predicates)
    }

    fn is_typed_constraint(&self, name: &str) -> bool {
        matches!(name, "minValue" | "maxValue" | "notValue")
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::UInt(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

struct MinValue(Value);

impl Constraint for MinValue {
    fn is_met(&self, value: Option<&Value>, _type_name: Option<&str>) -> bool {
        match (value.and_then(as_f64), as_f64(&self.0)) {
            (Some(received), Some(min)) => received >= min,
            _ => false,
        }
    }
}

struct MaxValue(Value);

impl Constraint for MaxValue {
    fn is_met(&self, value: Option<&Value>, _type_name: Option<&str>) -> bool {
        match (value.and_then(as_f64), as_f64(&self.0)) {
            (Some(received), Some(max)) => received <= max,
            _ => false,
        }
    }
}

struct NotValue(Value);

impl Constraint for NotValue {
    fn is_met(&self, value: Option<&Value>, _type_name: Option<&str>) -> bool {
        value != Some(&self.0)
    }
}

struct HasValue(bool);

impl Constraint for HasValue {
    fn is_met(&self, value: Option<&Value>, _type_name: Option<&str>) -> bool {
        value.is_some() == self.0
    }
}

struct TypeIs(String);

impl Constraint for TypeIs {
    fn is_met(&self, _value: Option<&Value>, type_name: Option<&str>) -> bool {
        type_name == Some(self.0.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Value normalizer double
// ─────────────────────────────────────────────────────────────────

/// Straightforward fixups matching what a lossy document loader needs.
pub struct StdNormalizer;

impl testplan_core::ValueNormalizer for StdNormalizer {
    fn fix_integer_precision(&self, value: Value) -> Value {
        match value {
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                if f >= 0.0 {
                    Value::UInt(f as u64)
                } else {
                    Value::Int(f as i64)
                }
            }
            other => other,
        }
    }

    fn fix_unrepresentable_literal(&self, value: Value) -> Value {
        match value {
            Value::Str(s) => {
                if let Ok(u) = s.parse::<u64>() {
                    Value::UInt(u)
                } else if let Ok(i) = s.parse::<i64>() {
                    Value::Int(i)
                } else {
                    Value::Str(s)
                }
            }
            other => other,
        }
    }

    fn fix_float_literal_string(&self, value: Value) -> Value {
        match value {
            Value::Str(s) => match s.parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => Value::Str(s),
            },
            other => other,
        }
    }

    fn float_to_integer(&self, value: Value) -> Value {
        match value {
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                if f >= 0.0 {
                    Value::UInt(f as u64)
                } else {
                    Value::Int(f as i64)
                }
            }
            other => other,
        }
    }

    fn decode_octet_string(&self, value: Value) -> testplan_core::Result<Value> {
        match value {
            Value::Str(s) => {
                if let Some(hex) = s.strip_prefix("hex:") {
                    let mut bytes = Vec::with_capacity(hex.len() / 2);
                    let digits = hex.as_bytes();
                    if digits.len() % 2 != 0 {
                        return Err(PlanError::InvalidDocument(format!(
                            "odd-length hex literal: {s}"
                        )));
                    }
                    for pair in digits.chunks(2) {
                        let text = std::str::from_utf8(pair).expect("hex digits are ASCII");
                        let byte = u8::from_str_radix(text, 16).map_err(|_| {
                            PlanError::InvalidDocument(format!("bad hex literal: {s}"))
                        })?;
                        bytes.push(byte);
                    }
                    Ok(Value::Bytes(bytes))
                } else {
                    Ok(Value::Bytes(s.into_bytes()))
                }
            }
            other => Ok(other),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Fixture
// ─────────────────────────────────────────────────────────────────

/// Bundles the collaborator doubles so tests can compile plans in one
/// line.
pub struct Fixture {
    pub schema: TestSchema,
    pub gate: PassingGate,
    pub constraints: SimpleConstraints,
    pub normalizer: StdNormalizer,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            schema: TestSchema::new(),
            gate: PassingGate,
            constraints: SimpleConstraints,
            normalizer: StdNormalizer,
        }
    }

    pub fn config(&self) -> TestPlanConfig<'_> {
        TestPlanConfig {
            schema: &self.schema,
            gate: &self.gate,
            constraints: &self.constraints,
            normalizer: &self.normalizer,
            config_override: BTreeMap::new(),
        }
    }

    pub fn compile(&self, document: serde_json::Value) -> testplan_core::Result<TestPlan<'_>> {
        TestPlan::compile(&Value::from(document), self.config())
    }

    /// Compile a document that is expected to fail, returning the error.
    pub fn compile_err(&self, document: serde_json::Value) -> PlanError {
        match self.compile(document) {
            Err(err) => err,
            Ok(_) => panic!("expected compilation to fail"),
        }
    }
}
