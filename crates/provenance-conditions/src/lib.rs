//! # Provenance Conditions
//!
//! A small expression language for transaction preconditions such as
//! `amount >= 5 and recipient == 'bob'`. Conditions read the transaction's own
//! fields as variables and either hold or block admission.
//!
//! ## Evaluation
//!
//! - [`Evaluator::Reference`] walks the expression tree directly.
//! - [`Evaluator::Compiled`] lowers numeric expressions to bytecode for the
//!   stack [`vm`], falling back to the tree walker for anything the VM cannot
//!   express. Both give the same answer.
//!
//! A blank script always holds. Any error means the condition does not hold.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod eval;
pub mod parser;
pub mod vm;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use ast::{Expr, Value};
pub use compiler::{compile, Program};
pub use error::{ConditionError, Result};
pub use eval::evaluate;
pub use parser::parse;

/// Condition evaluation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evaluator {
    /// Tree-walking evaluator.
    Reference,
    /// Bytecode VM with reference fallback.
    #[default]
    Compiled,
}

impl Evaluator {
    /// Evaluate `script` against `context`.
    pub fn evaluate(&self, script: &str, context: &Map<String, JsonValue>) -> Result<bool> {
        let Some(expr) = parse(script)? else {
            return Ok(true);
        };

        match self {
            Evaluator::Reference => Ok(evaluate(&expr, context)?.is_truthy()),
            Evaluator::Compiled => match compile(&expr).and_then(|program| program.run(context)) {
                Err(ConditionError::Unsupported(reason)) => {
                    debug!(%reason, "condition falls back to reference evaluator");
                    Ok(evaluate(&expr, context)?.is_truthy())
                }
                other => other,
            },
        }
    }
}

impl FromStr for Evaluator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" => Ok(Self::Reference),
            "compiled" => Ok(Self::Compiled),
            other => Err(format!("unknown condition evaluator: {}", other)),
        }
    }
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::Compiled => f.write_str("compiled"),
        }
    }
}

/// Evaluate `script` with the default evaluator.
pub fn evaluate_condition(script: &str, context: &Map<String, JsonValue>) -> Result<bool> {
    Evaluator::default().evaluate(script, context)
}
