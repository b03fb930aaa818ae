//! Test-plan driver: document validation, config handling, compilation.

use crate::bindings::BindingStore;
use crate::compiler::{check_keys, opt_string, StepCompiler, PLAN_KEYS};
use crate::schema::{CapabilityGate, ConstraintParser, SchemaDirectory, ValueNormalizer};
use crate::sequence::StepSequence;
use std::collections::BTreeMap;
use testplan_types::{PlanError, Result, Value};
use tracing::debug;

/// Collaborators and overrides for compiling a test plan.
pub struct TestPlanConfig<'a> {
    pub schema: &'a dyn SchemaDirectory,
    pub gate: &'a dyn CapabilityGate,
    pub constraints: &'a dyn ConstraintParser,
    pub normalizer: &'a dyn ValueNormalizer,
    /// Caller-supplied config entries that take precedence over the
    /// document's. `Null` entries are ignored.
    pub config_override: BTreeMap<String, Value>,
}

/// A compiled test definition.
pub struct TestPlan<'a> {
    /// Definition name.
    pub name: Option<String>,
    /// Plan-level capability-gate expression.
    pub pics: Option<String>,
    sequence: StepSequence<'a>,
}

impl<'a> TestPlan<'a> {
    /// Compile an already-parsed test document.
    ///
    /// Fail-fast: the first compilation error aborts the whole
    /// definition; no partial plans are produced.
    pub fn compile(document: &Value, config: TestPlanConfig<'a>) -> Result<TestPlan<'a>> {
        let record = document
            .as_record()
            .ok_or_else(|| PlanError::InvalidDocument("test document must be a record".into()))?;
        check_keys(record, PLAN_KEYS)?;

        let name = opt_string(record.get("name"), "name")?;
        let pics = opt_string(record.get("PICS"), "PICS")?;

        let mut config_map = match record.get("config") {
            None => BTreeMap::new(),
            Some(value) => value
                .as_record()
                .cloned()
                .ok_or_else(|| PlanError::InvalidDocument("`config` must be a record".into()))?,
        };
        apply_overrides(&mut config_map, &config.config_override);

        // Known-variable defaults kept for legacy suites that rely on
        // them being present.
        populate_default(&mut config_map, "nodeId", Value::UInt(0x12345));
        populate_default(&mut config_map, "endpoint", Value::Str(String::new()));
        populate_default(&mut config_map, "cluster", Value::Str(String::new()));
        populate_default(&mut config_map, "timeout", Value::Str("90".into()));

        let mut store = BindingStore::from_config(&config_map);
        let compiler = StepCompiler::new(
            config.schema,
            config.gate,
            config.constraints,
            config.normalizer,
        );

        let mut steps = Vec::new();
        if let Some(tests) = record.get("tests") {
            let items = tests
                .as_list()
                .ok_or_else(|| PlanError::InvalidDocument("`tests` must be a list".into()))?;
            for raw in items {
                if let Some(step) = compiler.compile(raw, &mut store)? {
                    steps.push(step);
                }
            }
        }

        debug!(name = ?name, steps = steps.len(), "compiled test plan");

        Ok(TestPlan {
            name,
            pics,
            sequence: StepSequence::new(steps, store, compiler, config.constraints),
        })
    }

    /// Number of enabled steps.
    pub fn step_count(&self) -> usize {
        self.sequence.len()
    }

    /// The plan's step sequence.
    pub fn steps(&mut self) -> &mut StepSequence<'a> {
        &mut self.sequence
    }

    /// Consume the plan, keeping only its sequence.
    pub fn into_steps(self) -> StepSequence<'a> {
        self.sequence
    }
}

/// Overlay caller config entries onto the document's.
///
/// Overriding an entry that is a `defaultValue` record rewrites its
/// nested default; anything else is replaced wholesale.
fn apply_overrides(config: &mut BTreeMap<String, Value>, overrides: &BTreeMap<String, Value>) {
    for (key, value) in overrides {
        if value.is_null() {
            continue;
        }
        match config.get_mut(key) {
            Some(Value::Record(fields)) if fields.contains_key("defaultValue") => {
                fields.insert("defaultValue".to_string(), value.clone());
            }
            Some(existing) => *existing = value.clone(),
            None => {
                config.insert(key.clone(), value.clone());
            }
        }
    }
}

fn populate_default(config: &mut BTreeMap<String, Value>, key: &str, value: Value) {
    config.entry(key.to_string()).or_insert(value);
}
