//! BCS argument assembly for the Move-chain variants of the two entry
//! functions. The EVM adapter ignores this; the Move adapter submits these
//! byte vectors verbatim.

use wbtc_bridge_primitives::moveargs::{
    encode_address, encode_bytes, encode_u64, encode_vec_bytes32, encode_vec_u16,
};

use crate::types::{MintCall, PrepareCall};

/// `mint(btc_tx_id: vector<u8>, receiver: address, amount: u64, rx:
/// vector<u8>, s: vector<u8>)`.
pub fn mint_call_args(call: &MintCall) -> Vec<Vec<u8>> {
    vec![
        encode_bytes(call.btc_tx_id.as_slice()),
        encode_address(call.receiver),
        encode_u64(call.amount.saturating_to()),
        encode_bytes(call.rx.as_slice()),
        encode_bytes(call.s.as_slice()),
    ]
}

/// `redeem_prepare(request_tx_hash: vector<u8>, requester: address, amount:
/// u64, outpoint_tx_ids: vector<vector<u8>>, outpoint_idxs: vector<u16>,
/// rx: vector<u8>, s: vector<u8>)`.
pub fn prepare_call_args(call: &PrepareCall) -> Vec<Vec<u8>> {
    let tx_ids: Vec<[u8; 32]> = call.outpoint_tx_ids.iter().map(|id| id.0).collect();

    vec![
        encode_bytes(call.request_tx_hash.as_slice()),
        encode_address(call.requester),
        encode_u64(call.amount.saturating_to()),
        encode_vec_bytes32(&tx_ids),
        encode_vec_u16(&call.outpoint_idxs),
        encode_bytes(call.rx.as_slice()),
        encode_bytes(call.s.as_slice()),
    ]
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, B256, U256};

    use super::*;

    #[test]
    fn mint_args_are_bcs_shaped() {
        let call = MintCall {
            btc_tx_id: B256::repeat_byte(1),
            receiver: address!("dab18f11a915c12948e27f07a4be7e54e14f3940"),
            amount: U256::from(20_000_000u64),
            rx: B256::repeat_byte(2),
            s: B256::repeat_byte(3),
        };

        let args = mint_call_args(&call);
        assert_eq!(args.len(), 5);

        // 32-byte vectors carry a single-byte length prefix
        assert_eq!(args[0].len(), 33);
        assert_eq!(args[0][0], 32);

        // address widened to 32 bytes, no prefix
        assert_eq!(args[1].len(), 32);

        // u64 little-endian
        assert_eq!(args[2], 20_000_000u64.to_le_bytes().to_vec());
    }

    #[test]
    fn prepare_args_cover_empty_and_populated_outpoints() {
        let base = PrepareCall {
            request_tx_hash: B256::repeat_byte(4),
            requester: address!("dab18f11a915c12948e27f07a4be7e54e14f3940"),
            amount: U256::from(10_000_000u64),
            outpoint_tx_ids: vec![],
            outpoint_idxs: vec![],
            rx: B256::repeat_byte(5),
            s: B256::repeat_byte(6),
        };

        let args = prepare_call_args(&base);
        assert_eq!(args[3], vec![0x00]);
        assert_eq!(args[4], vec![0x00]);

        let populated = PrepareCall {
            outpoint_tx_ids: vec![B256::repeat_byte(7), B256::repeat_byte(8)],
            outpoint_idxs: vec![0, 513],
            ..base
        };

        let args = prepare_call_args(&populated);
        assert_eq!(args[3][0], 2);
        assert_eq!(args[3].len(), 1 + 2 * 33);
        assert_eq!(args[4], vec![0x02, 0x00, 0x00, 0x01, 0x02]);
    }
}
