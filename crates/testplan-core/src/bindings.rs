//! Variable bindings with compile-time and runtime lifetimes.
//!
//! The compile-time store is seeded from the document config and
//! accumulates every `saveAs` declaration while steps compile. Once the
//! whole definition has compiled it is frozen by cloning it into the
//! runtime store, which is then mutated destructively after each step's
//! post-processing (last write wins).

use std::collections::BTreeMap;
use testplan_types::{PlanError, Result, Value};

/// State of one declared variable.
///
/// A name, once declared, always resolves to either its bound value or
/// `Unbound` — never "undeclared".
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Declared (a `saveAs` target) but not yet written.
    Unbound,
    Bound(Value),
}

/// Name → binding map.
#[derive(Debug, Clone, Default)]
pub struct BindingStore {
    entries: BTreeMap<String, Binding>,
}

impl BindingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with every config entry bound.
    pub fn from_config(config: &BTreeMap<String, Value>) -> Self {
        Self {
            entries: config
                .iter()
                .map(|(name, value)| (name.clone(), Binding::Bound(value.clone())))
                .collect(),
        }
    }

    /// Whether the name is declared, bound or not.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declare a name without binding it. No-op if already declared.
    pub fn declare(&mut self, name: &str) {
        self.entries
            .entry(name.to_string())
            .or_insert(Binding::Unbound);
    }

    /// Bind a value to a name, declaring it if needed. Last write wins.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_string(), Binding::Bound(value));
    }

    /// The binding for a name, if declared.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries.get(name)
    }

    /// The raw bound value for a name; `None` if unbound or undeclared.
    pub fn config_value(&self, name: &str) -> Option<&Value> {
        match self.entries.get(name) {
            Some(Binding::Bound(value)) => Some(value),
            _ => None,
        }
    }

    /// The substitutable value for a name.
    ///
    /// A bound record carrying a `defaultValue` field substitutes that
    /// nested default instead of the record itself. `Null` never
    /// substitutes, so it resolves to `None` like an unbound name.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        let value = self.config_value(name)?;
        let value = match value.get("defaultValue") {
            Some(default) => default,
            None => value,
        };
        if value.is_null() {
            None
        } else {
            Some(value)
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Placeholder substitution
    // ─────────────────────────────────────────────────────────────

    /// Substitute variable placeholders throughout a value.
    ///
    /// Recurses through lists and records; only scalar string leaves are
    /// candidates. Idempotent on inputs containing no recognizable
    /// variable token.
    pub fn substitute(&self, value: &Value) -> Result<Value> {
        match value {
            Value::List(items) => {
                let substituted: Result<Vec<Value>> =
                    items.iter().map(|item| self.substitute(item)).collect();
                Ok(Value::List(substituted?))
            }
            Value::Record(fields) => {
                let substituted: Result<BTreeMap<String, Value>> = fields
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.substitute(item)?)))
                    .collect();
                Ok(Value::Record(substituted?))
            }
            Value::Str(text) => self.substitute_str(text),
            other => Ok(other.clone()),
        }
    }

    /// Substitute within one whitespace-delimited token sequence.
    ///
    /// A single remaining token returns its value directly (typed, not
    /// stringified). Multiple tokens with at least one substitution are
    /// rendered into an expression and evaluated; multiple tokens with no
    /// substitution come back as the joined string, untouched.
    fn substitute_str(&self, text: &str) -> Result<Value> {
        enum Token<'a> {
            Raw(&'a str),
            Substituted(&'a Value),
        }

        let raw_tokens: Vec<&str> = text.split_whitespace().collect();
        if raw_tokens.is_empty() {
            return Ok(Value::Str(text.to_string()));
        }

        let mut substituted = false;
        let tokens: Vec<Token> = raw_tokens
            .iter()
            .map(|&token| match self.resolve(token) {
                Some(value) => {
                    substituted = true;
                    Token::Substituted(value)
                }
                None => Token::Raw(token),
            })
            .collect();

        if let [token] = tokens.as_slice() {
            return Ok(match token {
                Token::Raw(text) => Value::Str((*text).to_string()),
                Token::Substituted(value) => (*value).clone(),
            });
        }

        if !substituted {
            return Ok(Value::Str(raw_tokens.join(" ")));
        }

        let rendered: Vec<String> = tokens
            .iter()
            .map(|token| match token {
                Token::Raw(text) => (*text).to_string(),
                Token::Substituted(value) => render_operand(value),
            })
            .collect();
        let expression = rendered.join(" ");

        testplan_expr::evaluate(&expression).map_err(|err| PlanError::Evaluation {
            expression,
            message: err.to_string(),
        })
    }
}

/// Render a substituted value as an expression operand.
///
/// Strings are quoted so that concatenation survives the round trip
/// through the expression evaluator; everything else renders via its
/// display form.
fn render_operand(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}
