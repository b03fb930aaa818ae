//! Shared types for the testplan crates.
//!
//! Defines the dynamic document [`Value`] model and the fail-fast
//! compilation error types used across all stages.

mod error;
mod value;

pub use error::{FieldHint, PlanError};
pub use value::Value;

/// Result type used throughout the testplan crates.
pub type Result<T> = std::result::Result<T, PlanError>;
