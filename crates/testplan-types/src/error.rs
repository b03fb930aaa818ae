//! Fail-fast compilation errors.
//!
//! Compilation of a test definition aborts on the first error — no partial
//! definitions are produced. Expectation mismatches at validation time are
//! NOT errors in this sense; they are recorded as result entries.

use std::fmt;
use thiserror::Error;

/// What the compiler can suggest when a field name does not resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldHint {
    /// A case-insensitive match exists.
    DidYouMean(String),
    /// No near-match; all known field names.
    Candidates(Vec<String>),
}

impl fmt::Display for FieldHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DidYouMean(name) => write!(f, "Did you mean \"{name}\"?"),
            Self::Candidates(names) => write!(f, "Candidates are: {names:?}."),
        }
    }
}

/// An error raised while compiling a test definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// A document section carries a key outside its fixed recognized set.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// A command argument or response entry names a field the schema does
    /// not know.
    #[error("\"{label}\": unknown field: \"{field}\". {hint}")]
    UnknownField {
        /// Label of the step the entry belongs to (may be empty).
        label: String,
        field: String,
        hint: FieldHint,
    },

    /// A constraints block failed to parse.
    #[error("constraint syntax error: {0}")]
    ConstraintSyntax(String),

    /// A substituted placeholder expression failed to evaluate.
    #[error("failed to evaluate `{expression}`: {message}")]
    Evaluation {
        expression: String,
        message: String,
    },

    /// The document is structurally malformed.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
