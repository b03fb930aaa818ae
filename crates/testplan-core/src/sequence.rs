//! Single-pass iteration over a compiled definition's steps.
//!
//! [`StepSequence`] is deliberately not an [`Iterator`]: pulling a step
//! re-applies placeholder substitution and normalization against shared
//! binding state, and the yielded [`ReadyStep`] mutably borrows the
//! runtime store so a second pull cannot happen while one is in flight.
//! The sequence is single-pass and non-restartable — an abandoned
//! sequence simply stops being pulled.

use crate::bindings::BindingStore;
use crate::compiler::StepCompiler;
use crate::schema::ConstraintParser;
use crate::step::{ArgumentsSpec, CompiledStep, ResponseSpec, ValueEntry};
use crate::validator::{InteractionResponse, PostProcessResult, ResponseValidator};
use testplan_types::{Result, Value};
use tracing::debug;

/// Lazy, stateful iterator over a definition's enabled compiled steps.
///
/// Disabled steps were excluded at compile time and never contribute to
/// the step count. The caller must run the yielded step's
/// `post_process_response` before requesting the next step: later
/// substitutions depend on bindings written by the previous step's
/// save-as stage.
pub struct StepSequence<'a> {
    steps: Vec<CompiledStep>,
    /// Frozen snapshot of the compile-time store; normalization consults
    /// it to recognize unresolved variable tokens.
    compile_store: BindingStore,
    /// Mutable runtime bindings: written by post-processing, read by
    /// substitution, in strict alternation.
    runtime_store: BindingStore,
    position: usize,
    compiler: StepCompiler<'a>,
    constraints: &'a dyn ConstraintParser,
}

impl<'a> StepSequence<'a> {
    pub(crate) fn new(
        steps: Vec<CompiledStep>,
        compile_store: BindingStore,
        compiler: StepCompiler<'a>,
        constraints: &'a dyn ConstraintParser,
    ) -> Self {
        let runtime_store = compile_store.clone();
        Self {
            steps,
            compile_store,
            runtime_store,
            position: 0,
            compiler,
            constraints,
        }
    }

    /// Total number of enabled steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `true` when the definition has no enabled steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps issued so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The current runtime bindings.
    pub fn bindings(&self) -> &BindingStore {
        &self.runtime_store
    }

    /// Prepare and yield the next step.
    ///
    /// Substitutes placeholders in the step's argument and response specs
    /// against the current runtime bindings, then re-runs type-directed
    /// normalization, since substitution may introduce native values that
    /// still need schema-directed fixups. Substitution only runs for
    /// steps whose capability gate passed.
    pub fn next_step(&mut self) -> Option<Result<ReadyStep<'_>>> {
        if self.position >= self.steps.len() {
            return None;
        }
        let index = self.position;
        self.position += 1;

        let step = &self.steps[index];
        debug!(position = index, label = ?step.label, "issuing step");

        let mut arguments = step.arguments.clone();
        let mut response = step.response.clone();
        let mut node_id = step.node_id.clone();

        if step.pics_enabled {
            let prepared = prepare_step(
                step,
                &mut arguments,
                &mut response,
                &mut node_id,
                &self.runtime_store,
                &self.compile_store,
                &self.compiler,
            );
            if let Err(err) = prepared {
                return Some(Err(err));
            }
        }

        Some(Ok(ReadyStep {
            step,
            arguments,
            response,
            node_id,
            constraints: self.constraints,
            bindings: &mut self.runtime_store,
        }))
    }
}

/// Substitute then re-normalize one step's cloned specs.
fn prepare_step(
    step: &CompiledStep,
    arguments: &mut Option<ArgumentsSpec>,
    response: &mut Option<ResponseSpec>,
    node_id: &mut Option<Value>,
    runtime_store: &BindingStore,
    compile_store: &BindingStore,
    compiler: &StepCompiler<'_>,
) -> Result<()> {
    if let Some(spec) = arguments.as_mut() {
        substitute_entries(runtime_store, &mut spec.values)?;
    }
    if let Some(spec) = response.as_mut() {
        substitute_entries(runtime_store, &mut spec.values)?;
    }
    if let Some(value) = node_id.take() {
        *node_id = Some(runtime_store.substitute(&value)?);
    }

    let label = step.label.as_deref().unwrap_or_default();
    let kind = step.kind();
    if let Some(spec) = arguments.as_mut() {
        compiler.normalize_entries(
            &mut spec.values,
            &step.argument_mapping,
            kind,
            label,
            compile_store,
        )?;
    }
    if let Some(spec) = response.as_mut() {
        compiler.normalize_entries(
            &mut spec.values,
            &step.response_mapping,
            kind,
            label,
            compile_store,
        )?;
    }
    Ok(())
}

/// Substitute placeholders in every entry's value and constraint operands.
fn substitute_entries(store: &BindingStore, entries: &mut [ValueEntry]) -> Result<()> {
    for entry in entries.iter_mut() {
        if let Some(value) = entry.value.take() {
            entry.value = Some(store.substitute(&value)?);
        }
        if let Some(block) = entry.constraints.as_mut() {
            for operand in block.values_mut() {
                let value = std::mem::replace(operand, Value::Null);
                *operand = store.substitute(&value)?;
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// ReadyStep
// ─────────────────────────────────────────────────────────────────────

/// A step with all placeholders resolved, ready to execute.
///
/// The caller executes the described interaction against the real target,
/// then hands the response to [`ReadyStep::post_process_response`].
/// Consuming the step releases the sequence for the next pull.
pub struct ReadyStep<'s> {
    step: &'s CompiledStep,
    /// Substituted argument value-list.
    pub arguments: Option<ArgumentsSpec>,
    /// Substituted expected-response spec.
    pub response: Option<ResponseSpec>,
    /// Substituted node id.
    pub node_id: Option<Value>,
    constraints: &'s dyn ConstraintParser,
    bindings: &'s mut BindingStore,
}

impl ReadyStep<'_> {
    /// The underlying compiled step.
    pub fn compiled(&self) -> &CompiledStep {
        self.step
    }

    /// The step's label, if any.
    pub fn label(&self) -> Option<&str> {
        self.step.label.as_deref()
    }

    /// Whether the step's capability gate passed; gated-out steps should
    /// not be executed against the target.
    pub fn is_pics_enabled(&self) -> bool {
        self.step.pics_enabled
    }

    /// Check the device response against the step's expectations and
    /// write any save-as bindings into the runtime store.
    pub fn post_process_response(self, response: &InteractionResponse) -> PostProcessResult {
        ResponseValidator::new(
            self.step,
            self.response.as_ref(),
            self.constraints,
            self.bindings,
        )
        .validate(response)
    }
}
