use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("payload exceeds maximum line budget")]
    Oversize,
    #[error("malformed trace line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TlResult<T> = Result<T, TlError>;
