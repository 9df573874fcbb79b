//! Deterministic digests signed by the threshold signer and verified by the
//! destination-chain contracts.

use alloy_primitives::{Address, B256, U256};
use bitcoin::{hashes::Hash, Txid};
use sha2::{Digest, Sha256};

use crate::redeem::{encode_outpoints, RedeemOutpoint};

/// Digest of a mint payload: `sha256(btc_tx_id ‖ receiver ‖ amount)` with the
/// amount widened to 32 big-endian bytes.
pub fn mint_signing_hash(btc_tx_id: Txid, receiver: Address, amount: u64) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(btc_tx_id.to_byte_array());
    hasher.update(receiver.as_slice());
    hasher.update(U256::from(amount).to_be_bytes::<32>());

    B256::from_slice(&hasher.finalize())
}

/// Digest of a prepare-redeem payload:
/// `sha256(request_tx_hash ‖ requester ‖ amount ‖ encode(outpoints))`.
///
/// The outpoint bytes are the same canonical encoding that is persisted, so a
/// reissue always re-signs identical bytes.
pub fn prepare_signing_hash(
    request_tx_hash: B256,
    requester: Address,
    amount: u64,
    outpoints: &[RedeemOutpoint],
) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(request_tx_hash.as_slice());
    hasher.update(requester.as_slice());
    hasher.update(U256::from(amount).to_be_bytes::<32>());
    hasher.update(encode_outpoints(outpoints));

    B256::from_slice(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    #[test]
    fn mint_hash_is_deterministic_and_input_sensitive() {
        let txid = Txid::from_byte_array([3u8; 32]);
        let receiver = address!("dab18f11a915c12948e27f07a4be7e54e14f3940");

        let a = mint_signing_hash(txid, receiver, 20_000_000);
        let b = mint_signing_hash(txid, receiver, 20_000_000);
        let c = mint_signing_hash(txid, receiver, 20_000_001);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn prepare_hash_covers_outpoints() {
        let request = B256::repeat_byte(9);
        let requester = address!("dab18f11a915c12948e27f07a4be7e54e14f3940");
        let outpoints = [RedeemOutpoint::new(Txid::from_byte_array([1u8; 32]), 0)];

        let with = prepare_signing_hash(request, requester, 10_000_000, &outpoints);
        let without = prepare_signing_hash(request, requester, 10_000_000, &[]);

        assert_ne!(with, without);
    }
}
