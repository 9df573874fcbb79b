//! Adapter for the external threshold-Schnorr signing service: the capability
//! trait, an in-process single-key implementation and a remote client.

pub mod error;
pub mod local;
pub mod remote;
pub mod types;

pub use error::{SignerError, SignerResult};
pub use local::LocalSigner;
pub use remote::RemoteSigner;
pub use types::{SignatureRequest, SignatureResponse, ThresholdSigner};
