//! testplan-core: compiles declarative device-interaction test steps into
//! executable units, resolves deferred variable placeholders, and
//! validates device responses against declared expectations.
//!
//! ```text
//! parsed document → TestPlan::compile → StepSequence → ReadyStep
//!                                            ↑              │ execute (caller)
//!                                            │              ▼
//!                                      save-as writes ← post_process_response
//! ```
//!
//! The core is strictly sequential and single-threaded: step N's
//! placeholder substitution can depend on a value saved during step
//! N−1's post-processing, so the runtime binding store has exactly one
//! writer and one reader context that alternate. Nothing here blocks,
//! performs I/O or suspends — device communication happens entirely in
//! the caller.
//!
//! External collaborators (the schema directory, the capability gate,
//! the constraint evaluator and the value normalizer) are trait seams in
//! [`schema`]; the core orchestrates them without implementing their
//! internals.

pub mod bindings;
pub mod compiler;
pub mod plan;
pub mod schema;
pub mod sequence;
pub mod step;
pub mod validator;

pub use bindings::{Binding, BindingStore};
pub use compiler::StepCompiler;
pub use plan::{TestPlan, TestPlanConfig};
pub use schema::{
    AttributeSignature, CapabilityGate, CommandSignature, Constraint, ConstraintParser, FieldType,
    SchemaDirectory, SchemaType, TypeMapping, ValueNormalizer,
};
pub use sequence::{ReadyStep, StepSequence};
pub use step::{ArgumentsSpec, CompiledStep, InteractionKind, ResponseSpec, ValueEntry};
pub use validator::{
    CheckCategory, CheckEntry, CheckStatus, InteractionResponse, PostProcessResult,
};

pub use testplan_types::{FieldHint, PlanError, Result, Value};
