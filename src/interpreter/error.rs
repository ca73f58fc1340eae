use thiserror::Error;

/// Typed errors produced during evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Operator '{operator}' expected {expected}, got {got}")]
    InvalidOperandType {
        operator: &'static str,
        expected: &'static str,
        got: String,
    },
    #[error("Invalid argument for '{name}': expected {expected}, got {got}")]
    InvalidArgumentType {
        name: &'static str,
        expected: &'static str,
        got: String,
    },
    #[error("Cannot compare {left} with {right}")]
    IncomparableTypes { left: String, right: String },
    #[error("Condition must be a bool, got {got}")]
    NonBooleanCondition { got: String },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("'{name}' is not callable: it is a {type_name}")]
    NotCallable { name: String, type_name: String },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Call depth exceeded the limit of {limit}")]
    RecursionLimitExceeded { limit: usize },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in '{operator}'")]
    IntegerOverflow { operator: &'static str },
    #[error("Array index must be non-negative, got {index}")]
    NegativeIndex { index: i64 },
    #[error("Array index out of bounds: index {index}, len {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Return outside of function")]
    ReturnOutsideFunction,
    #[error("Failed to write output: {message}")]
    Io { message: String },
}
