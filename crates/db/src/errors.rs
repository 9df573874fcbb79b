use thiserror::Error;

/// This is an alias for the result type returned by any database handle.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// The underlying driver failed; the caller should log and re-attempt on
    /// the next tick.
    #[error("database driver: {0}")]
    Driver(#[from] sqlx::Error),

    /// A stored value did not decode back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The vault cannot cover the requested amount from available UTXOs.
    #[error("insufficient funds: available {available} sat, required {required} sat")]
    InsufficientFunds { available: u64, required: u64 },

    /// An attempt to move a finalized-block cursor backwards.
    #[error("finalized block regress for {chain}: stored {stored}, new {new}")]
    FinalizedBlockRegress { chain: String, stored: u64, new: u64 },
}
