//! Turns one raw step description into a [`CompiledStep`].
//!
//! Compilation is fail-fast: the first unknown key, unresolvable field
//! name or malformed constraint aborts the whole test definition.

use crate::bindings::BindingStore;
use crate::schema::{CapabilityGate, ConstraintParser, SchemaDirectory, TypeMapping, ValueNormalizer};
use crate::step::{
    classify, ArgumentsSpec, CompiledStep, InteractionKind, ResponseSpec, ValueEntry,
};
use std::collections::BTreeMap;
use testplan_types::{FieldHint, PlanError, Result, Value};
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────
// Recognized key sets
// ─────────────────────────────────────────────────────────────────────

/// Keys allowed at the top level of a test document.
pub(crate) const PLAN_KEYS: &[&str] = &["name", "config", "tests", "PICS"];

/// Keys allowed on a step description.
const STEP_KEYS: &[&str] = &[
    "label",
    "cluster",
    "command",
    "disabled",
    "endpoint",
    "identity",
    "fabricFiltered",
    "groupId",
    "verification",
    "nodeId",
    "attribute",
    "event",
    "optional",
    "PICS",
    "arguments",
    "response",
    "minInterval",
    "maxInterval",
    "timedInteractionTimeoutMs",
    "busyWaitMs",
    "wait",
];

/// Keys allowed inside an `arguments` block.
const ARGUMENTS_KEYS: &[&str] = &["values", "value"];

/// Keys allowed inside a `response` block.
const RESPONSE_KEYS: &[&str] = &[
    "value",
    "values",
    "error",
    "clusterError",
    "constraints",
    "type",
    "hasMasksSet",
    "contains",
    "saveAs",
];

/// Leaf types whose literals need 64-bit integer-precision fixups.
const WIDE_INTEGER_LEAVES: &[&str] = &["int64u", "int64s", "bitmap64", "epoch_us"];

/// Leaf types carried as floats.
const FLOAT_LEAVES: &[&str] = &["single", "double"];

/// Leaf types whose literals decode into raw bytes.
const OCTET_STRING_LEAVES: &[&str] = &["octet_string", "long_octet_string"];

/// Field name injected by the transport framework; it bypasses schema
/// mapping lookup and normalization entirely (case-insensitive).
const FABRIC_INDEX_FIELD: &str = "fabricindex";

/// Validate a record's keys against a fixed recognized set.
pub(crate) fn check_keys(record: &BTreeMap<String, Value>, allowed: &[&str]) -> Result<()> {
    for key in record.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(PlanError::UnknownKey(key.clone()));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// StepCompiler
// ─────────────────────────────────────────────────────────────────────

/// Compiles raw step descriptions against the schema directory.
#[derive(Clone, Copy)]
pub struct StepCompiler<'a> {
    schema: &'a dyn SchemaDirectory,
    gate: &'a dyn CapabilityGate,
    constraints: &'a dyn ConstraintParser,
    normalizer: &'a dyn ValueNormalizer,
}

impl<'a> StepCompiler<'a> {
    /// Create a compiler over the given collaborators.
    pub fn new(
        schema: &'a dyn SchemaDirectory,
        gate: &'a dyn CapabilityGate,
        constraints: &'a dyn ConstraintParser,
        normalizer: &'a dyn ValueNormalizer,
    ) -> Self {
        Self {
            schema,
            gate,
            constraints,
            normalizer,
        }
    }

    /// Compile one raw step description.
    ///
    /// Returns `Ok(None)` for disabled steps: they are excluded before any
    /// further validation runs, so a suite can carry steps for
    /// not-yet-implemented features without breaking compilation.
    ///
    /// `bindings` is the shared compile-time store; newly declared
    /// `saveAs` names are registered into it.
    pub fn compile(
        &self,
        raw: &Value,
        bindings: &mut BindingStore,
    ) -> Result<Option<CompiledStep>> {
        let record = raw
            .as_record()
            .ok_or_else(|| PlanError::InvalidDocument("step description must be a record".into()))?;

        if record.get("disabled").is_some_and(Value::is_truthy) {
            return Ok(None);
        }

        check_keys(record, STEP_KEYS)?;

        let label = opt_string(record.get("label"), "label")?;
        let optional = record.get("optional").is_some_and(Value::is_truthy);
        let pics_enabled = self.gate.check(
            record
                .get("PICS")
                .and_then(Value::as_str),
        );

        let node_id = value_or_config(record, "nodeId", bindings);
        let group_id = value_or_config(record, "groupId", bindings);
        let endpoint = value_or_config(record, "endpoint", bindings);
        let cluster = opt_string(value_or_config(record, "cluster", bindings).as_ref(), "cluster")?;
        let command = opt_string(value_or_config(record, "command", bindings).as_ref(), "command")?;
        let attribute = opt_string(record.get("attribute"), "attribute")?;
        let event = opt_string(record.get("event"), "event")?;
        let identity = opt_string(record.get("identity"), "identity")?;
        let wait_for = opt_string(record.get("wait"), "wait")?;
        let fabric_filtered = match record.get("fabricFiltered") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_bool().ok_or_else(|| {
                PlanError::InvalidDocument("fabricFiltered must be a boolean".into())
            })?),
        };

        let kind = classify(command.as_deref(), wait_for.as_deref());

        let mut arguments = parse_arguments(record.get("arguments"))?;
        let mut response = parse_response(record.get("response"))?;

        let (argument_mapping, response_mapping, response_type_name) =
            self.resolve_mappings(kind, cluster.as_deref(), attribute.as_deref(), command.as_deref());

        // saveAs targets become declared-but-unbound before normalization,
        // so a value literally naming one is left for runtime substitution.
        if let Some(spec) = &response {
            for entry in &spec.values {
                if let Some(name) = &entry.save_as {
                    bindings.declare(name);
                }
            }
        }

        let label_text = label.clone().unwrap_or_default();
        if let Some(spec) = arguments.as_mut() {
            self.normalize_entries(&mut spec.values, &argument_mapping, kind, &label_text, bindings)?;
        }
        if let Some(spec) = response.as_mut() {
            self.normalize_entries(&mut spec.values, &response_mapping, kind, &label_text, bindings)?;
        }

        // Eagerly parse every declared constraint block through the same
        // path validation uses, so syntax errors surface at compile time
        // rather than minutes into a run.
        if let Some(spec) = &response {
            for entry in &spec.values {
                if let Some(block) = &entry.constraints {
                    self.constraints.parse(block)?;
                }
            }
        }

        debug!(label = label_text.as_str(), ?kind, "compiled step");

        Ok(Some(CompiledStep {
            label,
            pics_enabled,
            optional,
            node_id,
            group_id,
            cluster,
            command,
            attribute,
            event,
            endpoint,
            identity,
            fabric_filtered,
            min_interval: record.get("minInterval").cloned(),
            max_interval: record.get("maxInterval").cloned(),
            timed_interaction_timeout_ms: record.get("timedInteractionTimeoutMs").cloned(),
            busy_wait_ms: record.get("busyWaitMs").cloned(),
            wait_for,
            arguments,
            response,
            argument_mapping,
            response_mapping,
            response_type_name,
        }))
    }

    /// Resolve argument and response type mappings for the step's target.
    fn resolve_mappings(
        &self,
        kind: InteractionKind,
        cluster: Option<&str>,
        attribute: Option<&str>,
        command: Option<&str>,
    ) -> (TypeMapping, TypeMapping, Option<String>) {
        let unknown = (TypeMapping::Unknown, TypeMapping::Unknown, None);
        match kind {
            InteractionKind::Attribute => {
                let (Some(cluster), Some(attribute)) = (cluster, attribute) else {
                    return unknown;
                };
                let Some(signature) = self.schema.attribute_by_name(cluster, attribute) else {
                    return unknown;
                };
                let mapping =
                    TypeMapping::resolve(self.schema, cluster, Some(&signature.data_type));
                (mapping.clone(), mapping, Some(signature.data_type))
            }
            // Event pseudo-commands are not directory entries, so event
            // steps end up with unknown mappings here.
            InteractionKind::Event | InteractionKind::Command => {
                let (Some(cluster), Some(command)) = (cluster, command) else {
                    return unknown;
                };
                let Some(signature) = self.schema.command_by_name(cluster, command) else {
                    return unknown;
                };
                let argument_mapping =
                    TypeMapping::resolve(self.schema, cluster, signature.input_type.as_deref());
                let response_mapping =
                    TypeMapping::resolve(self.schema, cluster, signature.output_type.as_deref());
                (argument_mapping, response_mapping, signature.output_type)
            }
        }
    }

    /// Apply type-directed normalization to every entry of a value list.
    ///
    /// Re-run at sequence time on substituted specs, since substitution
    /// may introduce native values that still need schema-directed fixups.
    pub(crate) fn normalize_entries(
        &self,
        entries: &mut [ValueEntry],
        mapping: &TypeMapping,
        kind: InteractionKind,
        label: &str,
        bindings: &BindingStore,
    ) -> Result<()> {
        if mapping.is_unknown() {
            return Ok(());
        }

        for entry in entries.iter_mut() {
            if entry.is_empty() && entry.name.is_none() {
                continue;
            }

            let entry_mapping = match kind {
                InteractionKind::Attribute | InteractionKind::Event => mapping,
                InteractionKind::Command => {
                    let name = entry.name.as_deref().ok_or_else(|| {
                        PlanError::InvalidDocument(format!(
                            "\"{label}\": command value entry is missing a name"
                        ))
                    })?;
                    match mapping.field(name) {
                        Some(field_mapping) => field_mapping,
                        None => return Err(unknown_field(label, name, mapping)),
                    }
                }
            };

            if let Some(value) = entry.value.take() {
                entry.value = Some(self.normalize_value(value, entry_mapping, label, bindings)?);
            }

            if let Some(block) = entry.constraints.as_mut() {
                for (name, operand) in block.iter_mut() {
                    // Only operands that depend on the target field's type
                    // get normalized; they resolve against the container
                    // mapping.
                    if self.constraints.is_typed_constraint(name) {
                        let value = std::mem::replace(operand, Value::Null);
                        *operand = self.normalize_value(value, mapping, label, bindings)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Normalize one value against its resolved mapping.
    fn normalize_value(
        &self,
        value: Value,
        mapping: &TypeMapping,
        label: &str,
        bindings: &BindingStore,
    ) -> Result<Value> {
        if mapping.is_unknown() {
            return Ok(value);
        }

        match value {
            Value::Record(fields) => {
                let mut normalized = BTreeMap::new();
                for (key, item) in fields {
                    if key.eq_ignore_ascii_case(FABRIC_INDEX_FIELD) {
                        normalized.insert(key, item);
                        continue;
                    }
                    match mapping.field(&key) {
                        Some(field_mapping) => {
                            let item = self.normalize_value(item, field_mapping, label, bindings)?;
                            normalized.insert(key, item);
                        }
                        None if matches!(mapping, TypeMapping::Structured(_)) => {
                            return Err(unknown_field(label, &key, mapping));
                        }
                        // A record under a leaf mapping: no field
                        // information, pass through untouched.
                        None => {
                            normalized.insert(key, item);
                        }
                    }
                }
                Ok(Value::Record(normalized))
            }
            Value::List(items) => {
                let normalized: Result<Vec<Value>> = items
                    .into_iter()
                    .map(|item| self.normalize_value(item, mapping, label, bindings))
                    .collect();
                Ok(Value::List(normalized?))
            }
            scalar => {
                if scalar.is_null() {
                    return Ok(scalar);
                }
                // A string naming a declared variable is an unresolved
                // placeholder; substitution will produce the real value
                // later. Any other string is already a concrete value.
                if let Some(name) = scalar.as_str() {
                    if bindings.contains(name) {
                        return Ok(scalar);
                    }
                }
                Ok(match mapping.leaf_name() {
                    Some(leaf) if WIDE_INTEGER_LEAVES.contains(&leaf) => {
                        let fixed = self.normalizer.fix_integer_precision(scalar);
                        self.normalizer.fix_unrepresentable_literal(fixed)
                    }
                    Some(leaf) if FLOAT_LEAVES.contains(&leaf) => {
                        self.normalizer.fix_float_literal_string(scalar)
                    }
                    _ if scalar.is_float() => self.normalizer.float_to_integer(scalar),
                    Some(leaf) if OCTET_STRING_LEAVES.contains(&leaf) => {
                        self.normalizer.decode_octet_string(scalar)?
                    }
                    Some("boolean") => Value::Bool(scalar.is_truthy()),
                    _ => scalar,
                })
            }
        }
    }
}

/// Build the `UnknownField` error for a failed field-name resolution:
/// a case-insensitive "did you mean" when a near-match exists, the full
/// candidate list otherwise.
fn unknown_field(label: &str, field: &str, mapping: &TypeMapping) -> PlanError {
    let candidates = mapping.field_names();
    let hint = match candidates
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(field))
    {
        Some(candidate) => FieldHint::DidYouMean(candidate.clone()),
        None => FieldHint::Candidates(candidates),
    };
    PlanError::UnknownField {
        label: label.to_string(),
        field: field.to_string(),
        hint,
    }
}

// ─────────────────────────────────────────────────────────────────────
// Raw section parsing
// ─────────────────────────────────────────────────────────────────────

/// The step's own value for `key` if present, else the shared default
/// from the config store.
fn value_or_config(
    record: &BTreeMap<String, Value>,
    key: &str,
    bindings: &BindingStore,
) -> Option<Value> {
    record
        .get(key)
        .cloned()
        .or_else(|| bindings.config_value(key).cloned())
}

pub(crate) fn opt_string(value: Option<&Value>, key: &str) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(PlanError::InvalidDocument(format!(
            "key `{key}` must be a string, got {}",
            other.type_name()
        ))),
    }
}

fn parse_arguments(container: Option<&Value>) -> Result<Option<ArgumentsSpec>> {
    let Some(container) = container else {
        return Ok(None);
    };
    let record = container
        .as_record()
        .ok_or_else(|| PlanError::InvalidDocument("arguments must be a record".into()))?;
    check_keys(record, ARGUMENTS_KEYS)?;
    let (values, _, _) = parse_values(record)?;
    Ok(Some(ArgumentsSpec { values }))
}

fn parse_response(container: Option<&Value>) -> Result<Option<ResponseSpec>> {
    let Some(container) = container else {
        return Ok(None);
    };
    let record = container
        .as_record()
        .ok_or_else(|| PlanError::InvalidDocument("response must be a record".into()))?;
    check_keys(record, RESPONSE_KEYS)?;
    let (values, error, cluster_error) = parse_values(record)?;
    Ok(Some(ResponseSpec {
        values,
        error,
        cluster_error,
    }))
}

/// Parse a section's value entries, normalizing single-value shorthand.
///
/// A section without a `values` list gets its bare
/// `value`/`constraints`/`saveAs` wrapped into a single-entry list;
/// `error`/`clusterError` pass through; any other bare key at this stage
/// is an unknown key.
fn parse_values(
    record: &BTreeMap<String, Value>,
) -> Result<(Vec<ValueEntry>, Option<Value>, Option<Value>)> {
    let error = record.get("error").cloned();
    let cluster_error = record.get("clusterError").cloned();

    if let Some(values) = record.get("values") {
        let items = values
            .as_list()
            .ok_or_else(|| PlanError::InvalidDocument("`values` must be a list".into()))?;
        let entries: Result<Vec<ValueEntry>> = items.iter().map(parse_value_entry).collect();
        return Ok((entries?, error, cluster_error));
    }

    let mut entry = ValueEntry::default();
    for (key, item) in record {
        match key.as_str() {
            "value" => entry.value = Some(item.clone()),
            "constraints" => entry.constraints = Some(expect_record(item, "constraints")?),
            "saveAs" => {
                entry.save_as = Some(
                    item.as_str()
                        .ok_or_else(|| {
                            PlanError::InvalidDocument("`saveAs` must be a string".into())
                        })?
                        .to_string(),
                )
            }
            "error" | "clusterError" => {}
            other => return Err(PlanError::UnknownKey(other.to_string())),
        }
    }
    Ok((vec![entry], error, cluster_error))
}

fn parse_value_entry(raw: &Value) -> Result<ValueEntry> {
    let record = raw
        .as_record()
        .ok_or_else(|| PlanError::InvalidDocument("value entry must be a record".into()))?;
    let mut entry = ValueEntry::default();
    for (key, item) in record {
        match key.as_str() {
            "name" => {
                entry.name = Some(
                    item.as_str()
                        .ok_or_else(|| {
                            PlanError::InvalidDocument("entry `name` must be a string".into())
                        })?
                        .to_string(),
                )
            }
            "value" => entry.value = Some(item.clone()),
            "constraints" => entry.constraints = Some(expect_record(item, "constraints")?),
            "saveAs" => {
                entry.save_as = Some(
                    item.as_str()
                        .ok_or_else(|| {
                            PlanError::InvalidDocument("`saveAs` must be a string".into())
                        })?
                        .to_string(),
                )
            }
            // Entries may carry auxiliary keys the core does not consume.
            _ => {}
        }
    }
    Ok(entry)
}

fn expect_record(value: &Value, key: &str) -> Result<BTreeMap<String, Value>> {
    value
        .as_record()
        .cloned()
        .ok_or_else(|| PlanError::InvalidDocument(format!("`{key}` must be a record")))
}
