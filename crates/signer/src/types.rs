use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SignerResult;

/// A request for a threshold signature over a 32-byte digest.
///
/// `id` is the domain identifier of the operation (mint `btc_tx_id` bytes or
/// redeem `request_tx_hash`); it travels with the request so a multiplexed
/// transport can route the response back to the originator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub id: B256,
    pub signing_hash: B256,
}

/// The `(rx, s)` scalars of a BIP340-style signature over `signing_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub id: B256,
    pub signing_hash: B256,
    pub rx: B256,
    pub s: B256,
}

impl SignatureResponse {
    /// The 64-byte wire form `rx ‖ s`.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.rx.as_slice());
        out[32..].copy_from_slice(self.s.as_slice());
        out
    }
}

/// The signing capability consumed by both transaction managers.
#[async_trait]
pub trait ThresholdSigner: Send + Sync {
    async fn sign_async(&self, request: SignatureRequest) -> SignerResult<SignatureResponse>;
}
