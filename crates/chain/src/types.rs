use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A block position pinned by number and hash so reorgs are detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: B256,
}

/// Receipt of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub block_hash: B256,
    pub success: bool,
}

/// Payload of `mint(btc_tx_id, receiver, amount, rx, s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintCall {
    pub btc_tx_id: B256,
    pub receiver: Address,
    pub amount: U256,
    pub rx: B256,
    pub s: B256,
}

/// Payload of `redeem_prepare(request_tx_hash, requester, amount,
/// outpoint_tx_ids, outpoint_idxs, rx, s)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareCall {
    pub request_tx_hash: B256,
    pub requester: Address,
    pub amount: U256,
    pub outpoint_tx_ids: Vec<B256>,
    pub outpoint_idxs: Vec<u16>,
    pub rx: B256,
    pub s: B256,
}
