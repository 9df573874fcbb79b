use thiserror::Error;

pub type ChainResult<T> = Result<T, ChainError>;

/// Destination-chain failures, bucketed by what the caller should do next.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The queried object does not exist (yet).
    #[error("not found")]
    NotFound,

    /// The node did not answer in time; retry next tick.
    #[error("timeout")]
    Timeout,

    /// The submission was rejected as structurally invalid.
    #[error("malformed: {0}")]
    Malformed(String),

    /// Transport-level failure; retry next tick.
    #[error("transport: {0}")]
    Transport(String),

    /// The node answered with something we cannot categorize. The tx may or
    /// may not have landed.
    #[error("limbo: {0}")]
    Limbo(String),
}

impl ChainError {
    /// Bucket an opaque node error string. The underlying chains return
    /// free-form messages, so the "not found" and "timeout" matches are
    /// deliberately string-based.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();

        if lower.contains("not found") || lower.contains("unknown block") {
            Self::NotFound
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("invalid") || lower.contains("malformed") {
            Self::Malformed(message.to_string())
        } else {
            Self::Limbo(message.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_) | Self::NotFound)
    }
}

impl From<jsonrpsee::core::ClientError> for ChainError {
    fn from(value: jsonrpsee::core::ClientError) -> Self {
        match value {
            jsonrpsee::core::ClientError::RequestTimeout => Self::Timeout,
            jsonrpsee::core::ClientError::Call(err) => Self::classify(err.message()),
            other => Self::Transport(other.to_string()),
        }
    }
}
