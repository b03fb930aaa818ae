//! Compiled test steps.
//!
//! A [`CompiledStep`] is the schema-resolved form of one raw step
//! description. It is created once at compile time and never changes
//! afterwards; placeholder substitution happens on per-pull clones of its
//! argument and response specs.

use crate::schema::TypeMapping;
use std::collections::BTreeMap;
use testplan_types::Value;

/// Pseudo-commands that make a step an attribute interaction.
pub(crate) const ATTRIBUTE_COMMANDS: &[&str] = &[
    "readAttribute",
    "writeAttribute",
    "subscribeAttribute",
    "waitForReport",
];

/// Pseudo-commands that make a step an event interaction.
pub(crate) const EVENT_COMMANDS: &[&str] = &["readEvent", "subscribeEvent"];

/// How a step interacts with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Read/write/subscribe on an attribute, or a report wait.
    Attribute,
    /// Read/subscribe on an event.
    Event,
    /// A cluster command invoke.
    Command,
}

/// Classify an interaction from the resolved command name or wait marker.
pub(crate) fn classify(command: Option<&str>, wait_for: Option<&str>) -> InteractionKind {
    let names = [command, wait_for];
    if names
        .iter()
        .flatten()
        .any(|name| ATTRIBUTE_COMMANDS.contains(name))
    {
        InteractionKind::Attribute
    } else if names
        .iter()
        .flatten()
        .any(|name| EVENT_COMMANDS.contains(name))
    {
        InteractionKind::Event
    } else {
        InteractionKind::Command
    }
}

/// One entry of an arguments or expected-response `values` list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueEntry {
    /// Field name, for command-style entries.
    pub name: Option<String>,
    /// The literal or placeholder value.
    pub value: Option<Value>,
    /// Declared constraint block, by constraint name.
    pub constraints: Option<BTreeMap<String, Value>>,
    /// Variable name the received value must be saved under.
    pub save_as: Option<String>,
}

impl ValueEntry {
    /// Returns `true` if the entry declares nothing at all.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.constraints.is_none() && self.save_as.is_none()
    }
}

/// The argument value-list of a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentsSpec {
    pub values: Vec<ValueEntry>,
}

/// The expected-response spec of a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSpec {
    /// Ordered expected value entries.
    pub values: Vec<ValueEntry>,
    /// Expected top-level error, if any.
    pub error: Option<Value>,
    /// Expected cluster-specific error, if any.
    pub cluster_error: Option<Value>,
}

/// A schema-resolved, ready-to-sequence test step.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    /// Human-readable step label.
    pub label: Option<String>,
    /// Whether the step's capability gate passed at compile time.
    pub pics_enabled: bool,
    /// Whether the target is allowed to report the interaction as
    /// unsupported.
    pub optional: bool,

    // Target selector.
    pub node_id: Option<Value>,
    pub group_id: Option<Value>,
    pub cluster: Option<String>,
    pub command: Option<String>,
    pub attribute: Option<String>,
    pub event: Option<String>,
    pub endpoint: Option<Value>,
    pub identity: Option<String>,
    pub fabric_filtered: Option<bool>,

    // Interaction timing parameters — advisory data for the caller.
    pub min_interval: Option<Value>,
    pub max_interval: Option<Value>,
    pub timed_interaction_timeout_ms: Option<Value>,
    pub busy_wait_ms: Option<Value>,
    /// Wait marker: the interaction the caller must wait to observe
    /// instead of issuing one.
    pub wait_for: Option<String>,

    pub arguments: Option<ArgumentsSpec>,
    pub response: Option<ResponseSpec>,

    pub(crate) argument_mapping: TypeMapping,
    pub(crate) response_mapping: TypeMapping,
    /// Type name behind `response_mapping`, for constraint checks on
    /// singular values.
    pub(crate) response_type_name: Option<String>,
}

impl CompiledStep {
    /// Classify the interaction from the resolved command or wait marker.
    pub fn kind(&self) -> InteractionKind {
        classify(self.command.as_deref(), self.wait_for.as_deref())
    }

    /// Whether the step's expectation targets the response's singular
    /// value rather than a named field of a command response record.
    pub fn has_singular_value(&self) -> bool {
        !matches!(self.kind(), InteractionKind::Command)
    }
}
