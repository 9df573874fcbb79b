use alloy_primitives::B256;
use async_trait::async_trait;
use secp256k1::{Keypair, Message, XOnlyPublicKey, SECP256K1};

use crate::{
    error::SignerResult,
    types::{SignatureRequest, SignatureResponse, ThresholdSigner},
};

/// In-process single-key signer for tests and dev runs. Produces plain BIP340
/// signatures, which share the `(rx, s)` wire form with the threshold
/// service's output.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    keypair: Keypair,
}

impl LocalSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// A signer over a freshly generated key.
    pub fn random() -> Self {
        let (secret_key, _) = SECP256K1.generate_keypair(&mut rand::thread_rng());
        Self {
            keypair: Keypair::from_secret_key(SECP256K1, &secret_key),
        }
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }
}

#[async_trait]
impl ThresholdSigner for LocalSigner {
    async fn sign_async(&self, request: SignatureRequest) -> SignerResult<SignatureResponse> {
        let message = Message::from_digest(request.signing_hash.0);
        let signature = SECP256K1.sign_schnorr(&message, &self.keypair);

        let bytes = signature.serialize();
        Ok(SignatureResponse {
            id: request.id,
            signing_hash: request.signing_hash,
            rx: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..]),
        })
    }
}
