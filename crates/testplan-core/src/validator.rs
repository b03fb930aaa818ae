//! Multi-stage response validation.
//!
//! Post-processing never fails in the error-propagation sense: every
//! expectation mismatch becomes an error entry in the result, so the
//! caller can mark a step failed while still choosing whether to continue
//! the run.

use crate::bindings::BindingStore;
use crate::schema::ConstraintParser;
use crate::step::{CompiledStep, ResponseSpec, ValueEntry};
use serde::Serialize;
use testplan_types::Value;

/// Status of one post-processing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Warning,
    Error,
}

/// Which validation stage produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    /// Wait-step tuple comparison.
    Wait,
    /// Top-level interaction status check.
    TopLevelStatus,
    /// Cluster-specific status check.
    ClusterStatus,
    /// Expected-value equality check.
    ResponseValue,
    /// Constraint predicate check.
    Constraint,
    /// Save-as variable capture.
    SaveAs,
}

/// One post-processing check that was performed.
#[derive(Debug, Clone, Serialize)]
pub struct CheckEntry {
    pub status: CheckStatus,
    pub category: CheckCategory,
    pub message: String,
}

/// Ordered results of post-processing one response.
///
/// The number and kinds of entries depend on the step itself; a result
/// with zero entries is a success.
#[derive(Debug, Default, Serialize)]
pub struct PostProcessResult {
    pub entries: Vec<CheckEntry>,
    successes: usize,
    warnings: usize,
    errors: usize,
}

impl PostProcessResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful check.
    pub fn success(&mut self, category: CheckCategory, message: impl Into<String>) {
        self.insert(CheckStatus::Success, category, message.into());
        self.successes += 1;
    }

    /// Record an informational warning. Warnings never affect the failure
    /// aggregate.
    pub fn warning(&mut self, category: CheckCategory, message: impl Into<String>) {
        self.insert(CheckStatus::Warning, category, message.into());
        self.warnings += 1;
    }

    /// Record a failed check.
    pub fn error(&mut self, category: CheckCategory, message: impl Into<String>) {
        self.insert(CheckStatus::Error, category, message.into());
        self.errors += 1;
    }

    /// `true` when no check failed.
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }

    /// `true` when at least one check failed.
    pub fn is_failure(&self) -> bool {
        self.errors != 0
    }

    pub fn success_count(&self) -> usize {
        self.successes
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    fn insert(&mut self, status: CheckStatus, category: CheckCategory, message: String) {
        self.entries.push(CheckEntry {
            status,
            category,
            message,
        });
    }
}

/// The response record the caller hands back after executing an
/// interaction against the real target.
#[derive(Debug, Clone, Default)]
pub struct InteractionResponse {
    pub error: Option<Value>,
    pub cluster_error: Option<Value>,
    pub value: Option<Value>,
    pub attribute: Option<String>,
    pub event: Option<String>,
    pub command: Option<String>,
    pub endpoint: Option<Value>,
    pub cluster: Option<String>,
    pub wait_for: Option<String>,
}

/// Top-level statuses an optional step is allowed to answer with.
const OPTIONAL_SKIP_STATUSES: &[&str] = &["UNSUPPORTED_ATTRIBUTE", "UNSUPPORTED_COMMAND"];

// ─────────────────────────────────────────────────────────────────────
// ResponseValidator
// ─────────────────────────────────────────────────────────────────────

/// Checks a device response against a compiled step's expectations.
pub(crate) struct ResponseValidator<'a> {
    step: &'a CompiledStep,
    /// The step's substituted response spec.
    response_spec: Option<&'a ResponseSpec>,
    constraints: &'a dyn ConstraintParser,
    /// Runtime store; save-as writes land here.
    bindings: &'a mut BindingStore,
}

impl<'a> ResponseValidator<'a> {
    pub(crate) fn new(
        step: &'a CompiledStep,
        response_spec: Option<&'a ResponseSpec>,
        constraints: &'a dyn ConstraintParser,
        bindings: &'a mut BindingStore,
    ) -> Self {
        Self {
            step,
            response_spec,
            constraints,
            bindings,
        }
    }

    /// Run the validation pipeline and collect the result.
    pub(crate) fn validate(mut self, response: &InteractionResponse) -> PostProcessResult {
        let mut result = PostProcessResult::new();

        if self.step.wait_for.is_some() {
            self.check_wait(response, &mut result);
            return result;
        }

        if self.should_skip(response) {
            return result;
        }

        self.check_top_level_error(response, &mut result);
        if let Some(spec) = self.response_spec {
            self.check_cluster_error(spec, response, &mut result);
            self.check_values(spec, response, &mut result);
            self.check_constraints(spec, response, &mut result);
            self.save_received_values(spec, response, &mut result);
        }

        result
    }

    /// Stage 1: wait steps compare the expected interaction 4-tuple
    /// against the observed one, position by position.
    fn check_wait(&self, response: &InteractionResponse, result: &mut PostProcessResult) {
        let category = CheckCategory::Wait;

        let (expected_type, received_type) = match self.step.kind() {
            crate::step::InteractionKind::Attribute => {
                (self.step.attribute.clone(), response.attribute.clone())
            }
            crate::step::InteractionKind::Event => {
                (self.step.event.clone(), response.event.clone())
            }
            crate::step::InteractionKind::Command => {
                (self.step.command.clone(), response.command.clone())
            }
        };

        // Cluster names in step descriptions do not always carry spaces
        // the way the schema spells them.
        let expected_cluster = self.step.cluster.as_ref().map(|c| c.replace(' ', ""));

        let expected: [Option<Value>; 4] = [
            self.step.wait_for.clone().map(Value::Str),
            self.step.endpoint.clone(),
            expected_cluster.map(Value::Str),
            expected_type.clone().map(Value::Str),
        ];
        let received: [Option<Value>; 4] = [
            response.wait_for.clone().map(Value::Str),
            response.endpoint.clone(),
            response.cluster.clone().map(Value::Str),
            received_type.map(Value::Str),
        ];

        let mut success = true;
        for (expected_value, received_value) in expected.iter().zip(received.iter()) {
            if expected_value != received_value {
                result.error(
                    category,
                    format!(
                        "The test expectation \"{} == {}\" is false",
                        display_opt(expected_value.as_ref()),
                        display_opt(received_value.as_ref())
                    ),
                );
                success = false;
            }
        }

        if success {
            result.success(
                category,
                format!(
                    "The test expectation \"{}\" for \"{}.{}\" on endpoint {} is true",
                    display_opt(self.step.wait_for.as_ref().map(String::as_str)),
                    display_opt(self.step.cluster.as_ref().map(String::as_str)),
                    display_opt(expected_type.as_deref()),
                    display_opt(self.step.endpoint.as_ref())
                ),
            );
        }
    }

    /// Stage 2: an optional step answered with an "unsupported" status is
    /// treated as a success with zero entries, and nothing else runs.
    fn should_skip(&self, response: &InteractionResponse) -> bool {
        if !self.step.optional {
            return false;
        }
        match response.error.as_ref().and_then(Value::as_str) {
            Some(status) => OPTIONAL_SKIP_STATUSES.contains(&status),
            None => false,
        }
    }

    /// Stage 3: exactly one of five outcomes, by (expected declared?,
    /// received present?). The match is exhaustive — there is no sixth
    /// case.
    fn check_top_level_error(
        &self,
        response: &InteractionResponse,
        result: &mut PostProcessResult,
    ) {
        let category = CheckCategory::TopLevelStatus;
        let expected = self.response_spec.and_then(|spec| spec.error.as_ref());
        let received = response.error.as_ref();

        match (expected, received) {
            (Some(expected), Some(received)) if expected == received => result.success(
                category,
                format!("The test expects the \"{expected}\" error which occurred successfully."),
            ),
            (Some(expected), Some(received)) => result.error(
                category,
                format!(
                    "The test expects the \"{expected}\" error but the \"{received}\" error occurred."
                ),
            ),
            (Some(expected), None) => result.error(
                category,
                format!("The test expects the \"{expected}\" error but no error occurred."),
            ),
            (None, Some(received)) => result.error(
                category,
                format!("The test expects no error but the \"{received}\" error occurred."),
            ),
            (None, None) => result.success(
                category,
                "The test expects no error and no error occurred.",
            ),
        }
    }

    /// Stage 4: cluster-specific status, only when one was declared.
    /// Nothing is emitted otherwise, to avoid duplicating stage 3.
    fn check_cluster_error(
        &self,
        spec: &ResponseSpec,
        response: &InteractionResponse,
        result: &mut PostProcessResult,
    ) {
        let category = CheckCategory::ClusterStatus;
        let Some(expected) = spec.cluster_error.as_ref() else {
            return;
        };

        match response.cluster_error.as_ref() {
            Some(received) if expected == received => result.success(
                category,
                format!("The test expects the \"{expected}\" error which occurred successfully."),
            ),
            Some(received) => result.error(
                category,
                format!(
                    "The test expects the \"{expected}\" error but the \"{received}\" error occurred."
                ),
            ),
            None => result.error(
                category,
                format!("The test expects the \"{expected}\" error but no error occurred."),
            ),
        }
    }

    /// Stage 5: one equality check per declared expected value.
    fn check_values(
        &self,
        spec: &ResponseSpec,
        response: &InteractionResponse,
        result: &mut PostProcessResult,
    ) {
        let category = CheckCategory::ResponseValue;

        for entry in &spec.values {
            let Some(expected) = &entry.value else {
                continue;
            };

            let (name, received) = match self.lookup_received(entry, response) {
                Ok(pair) => pair,
                Err(name) => {
                    result.error(category, does_not_exist(&name));
                    continue;
                }
            };

            if values_match(expected, received) {
                result.success(
                    category,
                    format!("The test expectation \"{name} == {expected}\" is true"),
                );
            } else {
                result.error(
                    category,
                    format!("The test expectation \"{name} == {expected}\" is false"),
                );
            }
        }
    }

    /// Stage 6: one aggregate constraint check per declared entry — the
    /// AND of its predicates.
    fn check_constraints(
        &self,
        spec: &ResponseSpec,
        response: &InteractionResponse,
        result: &mut PostProcessResult,
    ) {
        let category = CheckCategory::Constraint;

        for entry in &spec.values {
            let Some(block) = &entry.constraints else {
                continue;
            };

            // Unlike stage 5, a missing command response field is not an
            // error here — the predicates run against an absent value.
            let received = match self.lookup_received(entry, response) {
                Ok((_, received)) => received,
                Err(_) => None,
            };

            let type_name: Option<String> = if self.step.has_singular_value() {
                self.step.response_type_name.clone()
            } else {
                // No mapping happens for pseudo clusters; a typed
                // constraint there is checked against no type.
                entry
                    .name
                    .as_deref()
                    .and_then(|name| self.step.response_mapping.field(name))
                    .and_then(|mapping| mapping.leaf_name().map(String::from))
            };

            match self.constraints.parse(block) {
                Ok(predicates) => {
                    if predicates
                        .iter()
                        .all(|predicate| predicate.is_met(received, type_name.as_deref()))
                    {
                        result.success(category, "Constraints check passed");
                    } else {
                        result.error(category, "Constraints check failed");
                    }
                }
                Err(err) => result.error(category, err.to_string()),
            }
        }
    }

    /// Stage 7: bind received values to their save-as names. Last write
    /// wins; a missing source field is a loud error and skips the write.
    fn save_received_values(
        &mut self,
        spec: &ResponseSpec,
        response: &InteractionResponse,
        result: &mut PostProcessResult,
    ) {
        let category = CheckCategory::SaveAs;

        for entry in &spec.values {
            let Some(name) = &entry.save_as else {
                continue;
            };

            match self.lookup_received(entry, response) {
                Ok((_, received)) => {
                    let value = received.cloned().unwrap_or(Value::Null);
                    self.bindings.bind(name, value.clone());
                    result.success(
                        category,
                        format!("The test saved the value \"{value}\" as {name}."),
                    );
                }
                Err(missing) => result.error(category, does_not_exist(&missing)),
            }
        }
    }

    /// Resolve the received value an entry refers to.
    ///
    /// Attribute and event steps target the response's singular value;
    /// command steps look the entry's declared name up inside the
    /// response's value record. A missing field is `Err(name)`.
    fn lookup_received<'r>(
        &self,
        entry: &ValueEntry,
        response: &'r InteractionResponse,
    ) -> std::result::Result<(String, Option<&'r Value>), String> {
        if self.step.has_singular_value() {
            return Ok(("value".to_string(), response.value.as_ref()));
        }

        let name = entry.name.clone().unwrap_or_default();
        match response.value.as_ref().and_then(Value::as_record) {
            Some(record) if record.contains_key(&name) => {
                let received = record.get(&name);
                Ok((name, received))
            }
            _ => Err(name),
        }
    }
}

/// Recursive expected-vs-received comparison.
///
/// Lists require equal length and pairwise recursive equality. Records
/// are compared over the expected side's key set only — extra received
/// keys are ignored. Everything else compares by value equality; an
/// absent received value only matches an expected `Null`.
fn values_match(expected: &Value, received: Option<&Value>) -> bool {
    match expected {
        Value::List(expected_items) => match received {
            Some(Value::List(received_items)) => {
                expected_items.len() == received_items.len()
                    && expected_items
                        .iter()
                        .zip(received_items.iter())
                        .all(|(e, r)| values_match(e, Some(r)))
            }
            _ => false,
        },
        Value::Record(expected_fields) => match received {
            Some(Value::Record(received_fields)) => expected_fields
                .iter()
                .all(|(key, e)| values_match(e, received_fields.get(key))),
            _ => false,
        },
        other => match received {
            Some(received) => other == received,
            None => other.is_null(),
        },
    }
}

fn does_not_exist(name: &str) -> String {
    format!("The test expects a value named \"{name}\" but it does not exist in the response.")
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "none".to_string(),
    }
}
