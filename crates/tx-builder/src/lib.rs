//! Pure construction of the bridge's Bitcoin transactions and the pluggable
//! input-signing capability.

pub mod builder;
pub mod error;
pub mod signer;

pub use builder::{make_deposit_tx, make_redeem_tx, make_transfer_tx, SpendableUtxo};
pub use error::{BuilderError, BuilderResult};
pub use signer::{BridgeSigner, KeySigner, RemoteSchnorrSigner, SchnorrSigner, TxSigner};
