use thiserror::Error;

use super::codes::ErrorCode;

/// Errors raised by a node runner while performing a node's work.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("node failed: {0}")]
    Failed(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Failed(_) => ErrorCode::NodeFailed,
            Self::MissingInput(_) => ErrorCode::MissingInput,
            Self::InvalidPayload(_) => ErrorCode::InvalidPayload,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Timeouts and cancellations are never worth retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled | Self::InvalidPayload(_))
    }
}

impl From<anyhow::Error> for NodeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Errors raised while sampling system resources. Logged, never fatal.
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("process {0} not found")]
    ProcessNotFound(u32),

    #[error("sampling unavailable: {0}")]
    Unavailable(String),
}
