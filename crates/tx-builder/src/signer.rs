//! Input signing for bridge-issued transactions.
//!
//! One capability, three implementations: a single ECDSA key for p2pkh/p2wpkh
//! vault outputs, a local Schnorr key for p2tr outputs, and the remote
//! threshold service producing the same key-spend witnesses.

use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;
use bitcoin::{
    hashes::Hash,
    key::TapTweak,
    script::PushBytesBuf,
    sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType},
    Script, TxOut, Witness,
};
use bitcoin::{script::Builder, Transaction};
use secp256k1::{Keypair, Message, PublicKey, XOnlyPublicKey, SECP256K1};
use wbtc_bridge_signer::{SignatureRequest, ThresholdSigner};

use crate::error::{BuilderError, BuilderResult};

/// Capability to satisfy one input of an unsigned transaction. The prevout's
/// script type decides the sighash algorithm and the witness shape.
#[async_trait]
pub trait TxSigner: Send + Sync {
    fn public_key(&self) -> PublicKey;

    async fn sign_input(
        &self,
        tx: &mut Transaction,
        input_index: usize,
        prevouts: &[TxOut],
    ) -> BuilderResult<()>;

    async fn sign_all_inputs(
        &self,
        tx: &mut Transaction,
        prevouts: &[TxOut],
    ) -> BuilderResult<()> {
        for input_index in 0..tx.input.len() {
            self.sign_input(tx, input_index, prevouts).await?;
        }
        Ok(())
    }
}

fn prevout_for<'p>(
    prevouts: &'p [TxOut],
    input_index: usize,
) -> BuilderResult<&'p TxOut> {
    prevouts
        .get(input_index)
        .ok_or(BuilderError::InputOutOfRange(input_index))
}

/// Single-key ECDSA signer for p2pkh and p2wpkh prevouts.
#[derive(Debug, Clone)]
pub struct KeySigner {
    keypair: Keypair,
}

impl KeySigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl TxSigner for KeySigner {
    fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    async fn sign_input(
        &self,
        tx: &mut Transaction,
        input_index: usize,
        prevouts: &[TxOut],
    ) -> BuilderResult<()> {
        let prevout = prevout_for(prevouts, input_index)?.clone();
        let script = prevout.script_pubkey.as_script();

        if script.is_p2wpkh() {
            let sighash = SighashCache::new(&*tx)
                .p2wpkh_signature_hash(
                    input_index,
                    script,
                    prevout.value,
                    EcdsaSighashType::All,
                )
                .map_err(|e| BuilderError::Sighash(e.to_string()))?;

            let message = Message::from_digest(sighash.to_byte_array());
            let signature = bitcoin::ecdsa::Signature {
                signature: SECP256K1.sign_ecdsa(&message, &self.keypair.secret_key()),
                sighash_type: EcdsaSighashType::All,
            };

            let mut witness = Witness::new();
            witness.push(signature.to_vec());
            witness.push(self.public_key().serialize());
            tx.input[input_index].witness = witness;

            Ok(())
        } else if script.is_p2pkh() {
            let sighash = SighashCache::new(&*tx)
                .legacy_signature_hash(input_index, script, EcdsaSighashType::All.to_u32())
                .map_err(|e| BuilderError::Sighash(e.to_string()))?;

            let message = Message::from_digest(sighash.to_byte_array());
            let signature = bitcoin::ecdsa::Signature {
                signature: SECP256K1.sign_ecdsa(&message, &self.keypair.secret_key()),
                sighash_type: EcdsaSighashType::All,
            };

            let mut sig_push = PushBytesBuf::new();
            sig_push
                .extend_from_slice(&signature.to_vec())
                .map_err(|_| BuilderError::Sighash("signature push".to_string()))?;
            let mut pk_push = PushBytesBuf::new();
            pk_push
                .extend_from_slice(&self.public_key().serialize())
                .map_err(|_| BuilderError::Sighash("pubkey push".to_string()))?;

            tx.input[input_index].script_sig = Builder::new()
                .push_slice(sig_push)
                .push_slice(pk_push)
                .into_script();

            Ok(())
        } else {
            Err(BuilderError::UnsupportedScript(input_index))
        }
    }
}

fn taproot_sighash(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
    script: &Script,
) -> BuilderResult<[u8; 32]> {
    if !script.is_p2tr() {
        return Err(BuilderError::UnsupportedScript(input_index));
    }

    let sighash = SighashCache::new(tx)
        .taproot_key_spend_signature_hash(
            input_index,
            &Prevouts::All(prevouts),
            TapSighashType::Default,
        )
        .map_err(|e| BuilderError::Sighash(e.to_string()))?;

    Ok(sighash.to_byte_array())
}

/// Local Schnorr signer for p2tr key-spend prevouts.
#[derive(Debug, Clone)]
pub struct SchnorrSigner {
    keypair: Keypair,
}

impl SchnorrSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }
}

#[async_trait]
impl TxSigner for SchnorrSigner {
    fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    async fn sign_input(
        &self,
        tx: &mut Transaction,
        input_index: usize,
        prevouts: &[TxOut],
    ) -> BuilderResult<()> {
        let prevout = prevout_for(prevouts, input_index)?.clone();
        let digest = taproot_sighash(tx, input_index, prevouts, &prevout.script_pubkey)?;
        let message = Message::from_digest(digest);

        // key-spend signs with the output (tweaked) key
        let tweaked = self.keypair.tap_tweak(SECP256K1, None);
        let signature = SECP256K1.sign_schnorr(&message, &tweaked.to_inner());

        let mut witness = Witness::new();
        witness.push(signature.serialize());
        tx.input[input_index].witness = witness;

        Ok(())
    }
}

/// Remote variant: the taproot sighash is shipped to the threshold service and
/// the returned `(rx, s)` pair is assembled into the key-spend witness.
pub struct RemoteSchnorrSigner {
    service: Arc<dyn ThresholdSigner>,

    /// The aggregated (already tweaked) output key the service signs for.
    public_key: PublicKey,
}

impl RemoteSchnorrSigner {
    pub fn new(service: Arc<dyn ThresholdSigner>, public_key: PublicKey) -> Self {
        Self {
            service,
            public_key,
        }
    }
}

#[async_trait]
impl TxSigner for RemoteSchnorrSigner {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    async fn sign_input(
        &self,
        tx: &mut Transaction,
        input_index: usize,
        prevouts: &[TxOut],
    ) -> BuilderResult<()> {
        let prevout = prevout_for(prevouts, input_index)?.clone();
        let digest = taproot_sighash(tx, input_index, prevouts, &prevout.script_pubkey)?;

        let request = SignatureRequest {
            id: B256::from_slice(&tx.compute_txid().to_byte_array()),
            signing_hash: B256::from(digest),
        };
        let response = self.service.sign_async(request).await?;

        let mut witness = Witness::new();
        witness.push(response.to_bytes());
        tx.input[input_index].witness = witness;

        Ok(())
    }
}

/// The signer variants the bridge can run with.
pub enum BridgeSigner {
    SingleKey(KeySigner),
    SchnorrLocal(SchnorrSigner),
    SchnorrRemote(RemoteSchnorrSigner),
}

#[async_trait]
impl TxSigner for BridgeSigner {
    fn public_key(&self) -> PublicKey {
        match self {
            Self::SingleKey(signer) => signer.public_key(),
            Self::SchnorrLocal(signer) => signer.public_key(),
            Self::SchnorrRemote(signer) => signer.public_key(),
        }
    }

    async fn sign_input(
        &self,
        tx: &mut Transaction,
        input_index: usize,
        prevouts: &[TxOut],
    ) -> BuilderResult<()> {
        match self {
            Self::SingleKey(signer) => signer.sign_input(tx, input_index, prevouts).await,
            Self::SchnorrLocal(signer) => signer.sign_input(tx, input_index, prevouts).await,
            Self::SchnorrRemote(signer) => signer.sign_input(tx, input_index, prevouts).await,
        }
    }
}
