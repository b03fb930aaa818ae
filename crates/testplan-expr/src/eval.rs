//! Evaluates parsed expressions to document values.

use crate::error::ExprError;
use crate::parser::{BinOp, Expr};
use crate::ExprResult;
use testplan_types::Value;

/// Evaluate an expression node to a [`Value`].
///
/// Integer arithmetic is checked through an `i128` intermediate; results
/// are rendered as `Int` when they fit, `UInt` above `i64::MAX`.
pub fn evaluate(expr: &Expr) -> ExprResult<Value> {
    match expr {
        Expr::IntLit(n) => int_value(*n as i128),
        Expr::FloatLit(n) => Ok(Value::Float(*n)),
        Expr::StrLit(s) => Ok(Value::Str(s.clone())),
        Expr::Neg(inner) => match evaluate(inner)? {
            Value::Int(n) => int_value(-(n as i128)),
            Value::UInt(n) => int_value(-(n as i128)),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(ExprError::TypeMismatch(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        Expr::Binary { left, op, right } => {
            let lv = evaluate(left)?;
            let rv = evaluate(right)?;
            apply(*op, &lv, &rv)
        }
    }
}

fn apply(op: BinOp, lv: &Value, rv: &Value) -> ExprResult<Value> {
    use Value::*;
    match (lv, rv) {
        (Str(a), Str(b)) => match op {
            BinOp::Add => Ok(Value::Str(format!("{a}{b}"))),
            BinOp::Sub => Err(ExprError::TypeMismatch(
                "cannot subtract strings".into(),
            )),
        },
        (Int(_) | UInt(_), Int(_) | UInt(_)) => {
            let a = as_i128(lv);
            let b = as_i128(rv);
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
            };
            int_value(result)
        }
        (Int(_) | UInt(_) | Float(_), Int(_) | UInt(_) | Float(_)) => {
            let a = as_f64(lv);
            let b = as_f64(rv);
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
            };
            if result.is_finite() {
                Ok(Value::Float(result))
            } else {
                Err(ExprError::ArithmeticTrap(format!(
                    "{} produced a non-finite float",
                    symbol(op)
                )))
            }
        }
        _ => Err(ExprError::TypeMismatch(format!(
            "cannot apply '{}' to {} and {}",
            symbol(op),
            lv.type_name(),
            rv.type_name()
        ))),
    }
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
    }
}

fn as_i128(value: &Value) -> i128 {
    match value {
        Value::Int(n) => *n as i128,
        Value::UInt(n) => *n as i128,
        _ => unreachable!("caller checked integer operands"),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::UInt(n) => *n as f64,
        Value::Float(n) => *n,
        _ => unreachable!("caller checked numeric operands"),
    }
}

fn int_value(n: i128) -> ExprResult<Value> {
    if let Ok(v) = i64::try_from(n) {
        Ok(Value::Int(v))
    } else if let Ok(v) = u64::try_from(n) {
        Ok(Value::UInt(v))
    } else {
        Err(ExprError::ArithmeticTrap(format!(
            "integer result {n} is out of range"
        )))
    }
}
