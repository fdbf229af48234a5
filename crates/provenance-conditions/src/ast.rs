//! Expression tree and runtime values.

use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{ConditionError, Result};

/// Runtime value of a condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Returns the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
        }
    }

    /// Truthiness: zero, `0.0`, `False` and the empty string are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Bool(v) => *v,
            Value::Str(v) => !v.is_empty(),
        }
    }

    /// Numeric view, with booleans as 0 and 1. `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Str(_) => None,
        }
    }

    /// Convert the context binding for `name`.
    ///
    /// `null` counts as unbound. Arrays and objects have no representation.
    pub fn from_json(name: &str, value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Err(ConditionError::UnknownVariable(name.to_string())),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n.as_f64().map(Value::Float).ok_or_else(|| {
                    ConditionError::UnsupportedValue {
                        name: name.to_string(),
                        kind: "number",
                    }
                }),
            },
            JsonValue::String(s) => Ok(Value::Str(s.clone())),
            JsonValue::Array(_) => Err(ConditionError::UnsupportedValue {
                name: name.to_string(),
                kind: "array",
            }),
            JsonValue::Object(_) => Err(ConditionError::UnsupportedValue {
                name: name.to_string(),
                kind: "object",
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Str(v) => write!(f, "{:?}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    BitXor,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
            Self::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

impl CompareOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left op1 c1 op2 c2 ...`, true when every adjacent pair compares true.
    Compare {
        left: Box<Expr>,
        comparisons: Vec<(CompareOperator, Expr)>,
    },
    /// Two or more operands joined by the same boolean operator.
    BoolOp {
        op: BoolOperator,
        operands: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from_json("a", &json!(5)).unwrap(), Value::Int(5));
        assert_eq!(Value::from_json("a", &json!(2.5)).unwrap(), Value::Float(2.5));
        assert_eq!(
            Value::from_json("a", &json!(u64::MAX)).unwrap(),
            Value::Float(u64::MAX as f64)
        );
        assert_eq!(
            Value::from_json("a", &json!("bob")).unwrap(),
            Value::Str("bob".into())
        );
        assert_eq!(
            Value::from_json("a", &JsonValue::Null),
            Err(ConditionError::UnknownVariable("a".into()))
        );
        assert!(matches!(
            Value::from_json("a", &json!([1])),
            Err(ConditionError::UnsupportedValue { kind: "array", .. })
        ));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Float(-0.5).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
    }
}
