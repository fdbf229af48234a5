//! Reference evaluator: structural recursion over the expression tree.
//!
//! Integer arithmetic stays integral until it would overflow, then continues
//! in floating point. `/` always yields a float. Every operand of `and` and
//! `or` is evaluated. A comparison chain stops at its first false pair, and
//! operands after it are never evaluated.

use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

use crate::ast::{BinaryOperator, BoolOperator, CompareOperator, Expr, UnaryOperator, Value};
use crate::error::{ConditionError, Result};

/// Evaluate `expr` against the variables in `context`.
pub fn evaluate(expr: &Expr, context: &Map<String, JsonValue>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => lookup(name, context),
        Expr::UnaryOp { op, operand } => unary(*op, evaluate(operand, context)?),
        Expr::BinaryOp { op, left, right } => {
            let left = evaluate(left, context)?;
            let right = evaluate(right, context)?;
            binary(*op, left, right)
        }
        Expr::Compare { left, comparisons } => {
            let mut left = evaluate(left, context)?;
            for (op, operand) in comparisons {
                let right = evaluate(operand, context)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::BoolOp { op, operands } => {
            let values = operands
                .iter()
                .map(|operand| evaluate(operand, context))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Bool(match op {
                BoolOperator::And => values.iter().all(Value::is_truthy),
                BoolOperator::Or => values.iter().any(Value::is_truthy),
            }))
        }
    }
}

fn lookup(name: &str, context: &Map<String, JsonValue>) -> Result<Value> {
    match context.get(name) {
        Some(value) => Value::from_json(name, value),
        None => Err(ConditionError::UnknownVariable(name.to_string())),
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(Number::Int(*v)),
            Value::Bool(v) => Some(Number::Int(i64::from(*v))),
            Value::Float(v) => Some(Number::Float(*v)),
            Value::Str(_) => None,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    fn partial_cmp(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        }
    }
}

fn int_or_float(
    a: Number,
    b: Number,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        if let Some(v) = int_op(x, y) {
            return Value::Int(v);
        }
    }
    Value::Float(float_op(a.to_f64(), b.to_f64()))
}

fn power(base: Number, exponent: Number) -> Result<Value> {
    if let (Number::Int(x), Number::Int(y)) = (base, exponent) {
        if let Some(v) = u32::try_from(y).ok().and_then(|e| x.checked_pow(e)) {
            return Ok(Value::Int(v));
        }
    }
    let (x, y) = (base.to_f64(), exponent.to_f64());
    if x == 0.0 && y < 0.0 {
        return Err(ConditionError::DivisionByZero);
    }
    Ok(Value::Float(x.powf(y)))
}

fn binary(op: BinaryOperator, left: Value, right: Value) -> Result<Value> {
    if let (BinaryOperator::Add, Value::Str(a), Value::Str(b)) = (op, &left, &right) {
        return Ok(Value::Str(format!("{}{}", a, b)));
    }

    let mismatch = || ConditionError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };
    let (Some(a), Some(b)) = (Number::of(&left), Number::of(&right)) else {
        return Err(mismatch());
    };

    match op {
        BinaryOperator::Add => Ok(int_or_float(a, b, i64::checked_add, |x, y| x + y)),
        BinaryOperator::Sub => Ok(int_or_float(a, b, i64::checked_sub, |x, y| x - y)),
        BinaryOperator::Mul => Ok(int_or_float(a, b, i64::checked_mul, |x, y| x * y)),
        BinaryOperator::Div => {
            let divisor = b.to_f64();
            if divisor == 0.0 {
                return Err(ConditionError::DivisionByZero);
            }
            Ok(Value::Float(a.to_f64() / divisor))
        }
        BinaryOperator::Pow => power(a, b),
        BinaryOperator::BitXor => match (a, b) {
            (Number::Int(x), Number::Int(y)) => Ok(Value::Int(x ^ y)),
            _ => Err(mismatch()),
        },
    }
}

fn unary(op: UnaryOperator, operand: Value) -> Result<Value> {
    match op {
        UnaryOperator::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOperator::Neg => match Number::of(&operand) {
            Some(Number::Int(v)) => Ok(v
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(v as f64)))),
            Some(Number::Float(v)) => Ok(Value::Float(-v)),
            None => Err(ConditionError::InvalidOperand {
                op: "-",
                kind: operand.type_name(),
            }),
        },
    }
}

fn compare(op: CompareOperator, left: &Value, right: &Value) -> Result<bool> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (Number::of(left), Number::of(right)) {
            (Some(a), Some(b)) => a.partial_cmp(b),
            // Mixed kinds are never equal and have no order.
            _ => {
                return match op {
                    CompareOperator::Eq => Ok(false),
                    CompareOperator::NotEq => Ok(true),
                    _ => Err(ConditionError::TypeMismatch {
                        op: op.symbol(),
                        left: left.type_name(),
                        right: right.type_name(),
                    }),
                }
            }
        },
    };

    Ok(match op {
        CompareOperator::Eq => ordering == Some(Ordering::Equal),
        CompareOperator::NotEq => ordering != Some(Ordering::Equal),
        CompareOperator::Lt => ordering == Some(Ordering::Less),
        CompareOperator::LtE => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOperator::Gt => ordering == Some(Ordering::Greater),
        CompareOperator::GtE => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn context() -> Map<String, JsonValue> {
        match json!({
            "amount": 10,
            "price": 2.5,
            "recipient": "bob",
            "verified": true,
            "missing": null,
            "tags": ["a"],
        }) {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn eval(source: &str) -> Result<Value> {
        evaluate(&parse(source)?.expect("non-empty script"), &context())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("amount - 15").unwrap(), Value::Int(-5));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("4 / 2").unwrap(), Value::Float(2.0));
        assert_eq!(eval("amount * price").unwrap(), Value::Float(25.0));
        assert_eq!(eval("2 ** 10").unwrap(), Value::Int(1024));
        assert_eq!(eval("2 ** -1").unwrap(), Value::Float(0.5));
        assert_eq!(eval("-2 ** 2").unwrap(), Value::Int(-4));
        assert_eq!(eval("6 ^ 3").unwrap(), Value::Int(5));
        assert_eq!(eval("True + 1").unwrap(), Value::Int(2));
        assert_eq!(eval("'a' + 'b'").unwrap(), Value::Str("ab".into()));
    }

    #[test]
    fn test_integer_overflow_degrades_to_float() {
        assert_eq!(
            eval("9223372036854775807 + 1").unwrap(),
            Value::Float(9223372036854775808.0)
        );
        assert_eq!(eval("2 ** 64").unwrap(), Value::Float(18446744073709551616.0));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("amount >= 5").unwrap(), Value::Bool(true));
        assert_eq!(eval("recipient == 'bob'").unwrap(), Value::Bool(true));
        assert_eq!(eval("recipient != 'alice'").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 3 < 2").unwrap(), Value::Bool(false));
        assert_eq!(eval("10 == 10.0").unwrap(), Value::Bool(true));
        assert_eq!(eval("verified == 1").unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' < 'b'").unwrap(), Value::Bool(true));
        assert_eq!(eval("recipient == 5").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            eval("amount >= 5 and recipient == 'bob'").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval("amount > 50 or verified").unwrap(), Value::Bool(true));
        assert_eq!(eval("not verified").unwrap(), Value::Bool(false));
        assert_eq!(eval("0 or ''").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            eval("unknown > 1"),
            Err(ConditionError::UnknownVariable("unknown".into()))
        );
        assert_eq!(
            eval("missing > 1"),
            Err(ConditionError::UnknownVariable("missing".into()))
        );
        assert!(matches!(
            eval("tags == 1"),
            Err(ConditionError::UnsupportedValue { .. })
        ));
        assert_eq!(eval("amount / 0"), Err(ConditionError::DivisionByZero));
        assert_eq!(eval("0 ** -1"), Err(ConditionError::DivisionByZero));
        assert!(matches!(
            eval("recipient > 1"),
            Err(ConditionError::TypeMismatch { op: ">", .. })
        ));
        assert!(matches!(
            eval("recipient - 1"),
            Err(ConditionError::TypeMismatch { op: "-", .. })
        ));
        assert!(matches!(
            eval("-recipient"),
            Err(ConditionError::InvalidOperand { op: "-", .. })
        ));
        assert!(matches!(
            eval("1.5 ^ 1"),
            Err(ConditionError::TypeMismatch { op: "^", .. })
        ));
    }

    #[test]
    fn test_boolean_operands_all_evaluated() {
        // A false left side does not hide an error on the right.
        assert_eq!(
            eval("amount > 50 and unknown"),
            Err(ConditionError::UnknownVariable("unknown".into()))
        );
        assert_eq!(eval("True or 1 / 0"), Err(ConditionError::DivisionByZero));
    }

    #[test]
    fn test_comparison_chain_stops_at_first_false_pair() {
        assert_eq!(eval("2 < 1 < 1 / 0").unwrap(), Value::Bool(false));
        assert_eq!(eval("not (2 < 1 < unknown)").unwrap(), Value::Bool(true));
        assert_eq!(eval("(2 < 1 < unknown) or True").unwrap(), Value::Bool(true));
        assert_eq!(eval("amount < 5 > recipient").unwrap(), Value::Bool(false));

        // A true pair moves on to the next operand.
        assert_eq!(
            eval("1 < 2 < unknown"),
            Err(ConditionError::UnknownVariable("unknown".into()))
        );
        assert!(matches!(
            eval("1 < 2 < recipient"),
            Err(ConditionError::TypeMismatch { op: "<", .. })
        ));
    }
}
