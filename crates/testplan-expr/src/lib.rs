//! Whitelisted arithmetic/string expression evaluator.
//!
//! After placeholder substitution, a multi-token value such as
//! `myVar + 1` becomes `10 + 1` and must be computed before the step is
//! handed to the caller. Historically such strings were evaluated blindly;
//! this crate replaces that escape hatch with a tokenizer and a minimal
//! recursive-descent parser supporting `+`/`-` over numeric and string
//! operands, parenthesized groups, and nothing more.

mod error;
mod eval;
mod lexer;
mod parser;
mod token;

pub use error::ExprError;
pub use parser::{BinOp, Expr};
pub use token::{Token, TokenKind};

use testplan_types::Value;

/// Result alias for expression operations.
pub type ExprResult<T> = std::result::Result<T, ExprError>;

/// Evaluate an expression source string to a [`Value`].
pub fn evaluate(src: &str) -> ExprResult<Value> {
    let tokens = lexer::Lexer::new(src).lex()?;
    let expr = parser::Parser::new(tokens).parse()?;
    eval::evaluate(&expr)
}
