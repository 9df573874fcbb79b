use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A bridge-relevant event, decoded once at the adapter boundary and passed
/// inward as a tagged variant. Nothing beyond this module sees raw logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub block_number: u64,
    pub block_hash: B256,

    /// Hash of the transaction that emitted the event. For `RedeemRequested`
    /// this doubles as the redeem's `request_tx_hash`.
    pub tx_hash: B256,

    pub kind: ChainEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChainEventKind {
    /// The wrapped token was minted against a BTC deposit.
    Minted {
        btc_tx_id: B256,
        receiver: Address,
        amount: U256,
    },

    /// A user burned wrapped tokens and asked for BTC.
    RedeemRequested {
        requester: Address,
        amount: U256,
        receiver: String,
    },

    /// The contract accepted a prepared redeem pinned to vault outpoints.
    RedeemPrepared {
        request_tx_hash: B256,
        requester: Address,
        amount: U256,
        outpoint_tx_ids: Vec<B256>,
        outpoint_idxs: Vec<u16>,
    },
}

impl ChainEvent {
    /// The request hash a redeem event refers to, when it is one.
    pub fn request_tx_hash(&self) -> Option<B256> {
        match &self.kind {
            ChainEventKind::RedeemRequested { .. } => Some(self.tx_hash),
            ChainEventKind::RedeemPrepared {
                request_tx_hash, ..
            } => Some(*request_tx_hash),
            ChainEventKind::Minted { .. } => None,
        }
    }
}
