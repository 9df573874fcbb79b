use bitcoin::Amount;
use thiserror::Error;
use wbtc_bridge_signer::SignerError;

pub type BuilderResult<T> = Result<T, BuilderError>;

#[derive(Debug, Error)]
pub enum BuilderError {
    /// The selected inputs cannot cover `amount + fee`.
    #[error("change would be negative: inputs {inputs} < amount {amount} + fee {fee}")]
    ChangeNegative {
        inputs: Amount,
        amount: Amount,
        fee: Amount,
    },

    #[error("input {0} out of range")]
    InputOutOfRange(usize),

    /// The prevout's script type is not one this signer can satisfy.
    #[error("unsupported prevout script for input {0}")]
    UnsupportedScript(usize),

    #[error("sighash computation: {0}")]
    Sighash(String),

    #[error(transparent)]
    Signer(#[from] SignerError),
}
