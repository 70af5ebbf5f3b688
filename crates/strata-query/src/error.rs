//! Query error types

use thiserror::Error;

/// Query errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Unknown aggregate function: {0}")]
    UnknownAggregate(String),

    #[error("Wrong number of arguments to {call}: expected {expected}, got {got}")]
    ArityMismatch {
        call: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid argument to {call}: {reason}")]
    InvalidArgument { call: String, reason: String },

    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("Unexpected mapper output for {call}: {got}")]
    UnexpectedMapperOutput { call: String, got: &'static str },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;
