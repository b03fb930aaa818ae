//! Expression evaluation errors.

use thiserror::Error;

/// Errors raised while tokenizing, parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// A character outside the whitelisted grammar.
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    /// A string literal with no closing quote.
    #[error("unterminated string literal starting at offset {pos}")]
    UnterminatedString { pos: usize },

    /// A numeric literal that does not scan.
    #[error("invalid number literal at offset {pos}")]
    InvalidNumber { pos: usize },

    /// A token in a position the grammar does not allow.
    #[error("unexpected {found} at offset {pos}")]
    UnexpectedToken { found: String, pos: usize },

    /// Operands whose types the operator does not accept.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Integer overflow or a non-finite float result.
    #[error("arithmetic trap: {0}")]
    ArithmeticTrap(String),
}
