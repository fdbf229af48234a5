//! Errors raised while parsing, compiling or evaluating a condition.

use thiserror::Error;

/// Condition errors.
///
/// Any error means the condition does not hold; admission treats an error
/// exactly like `false`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    /// The script is not a well-formed expression.
    #[error("parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// A name is missing from the context or bound to `null`.
    #[error("variable '{0}' not found in context")]
    UnknownVariable(String),

    /// A context value the language has no representation for.
    #[error("variable '{name}' has unsupported type {kind}")]
    UnsupportedValue { name: String, kind: &'static str },

    /// A binary operator applied to operands it does not accept.
    #[error("operator {op} not supported between {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// A unary operator applied to an operand it does not accept.
    #[error("bad operand type for unary {op}: {kind}")]
    InvalidOperand { op: &'static str, kind: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    /// The expression cannot run on the bytecode VM.
    #[error("not supported by the compiled evaluator: {0}")]
    Unsupported(String),

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("bytecode truncated at offset {0}")]
    TruncatedBytecode(usize),

    #[error("variable slot {0} out of range")]
    InvalidSlot(u8),
}

pub type Result<T> = std::result::Result<T, ConditionError>;
