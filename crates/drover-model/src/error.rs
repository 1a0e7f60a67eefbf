use thiserror::Error;

/// Errors raised while mapping controller payloads onto domain types.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("unknown operation type: {0}")]
    UnknownOperationType(String),
}
