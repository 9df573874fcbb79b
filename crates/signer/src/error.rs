use thiserror::Error;

pub type SignerResult<T> = Result<T, SignerError>;

#[derive(Debug, Error)]
pub enum SignerError {
    /// The service did not answer within the caller's deadline.
    #[error("signing timed out")]
    Timeout,

    /// Transport-level failure, retry might help.
    #[error("signer transport: {0}")]
    Transport(String),

    /// The service answered but the response is unusable.
    #[error("signer rejected request: {0}")]
    Rejected(String),
}
