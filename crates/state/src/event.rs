use alloy_primitives::{Address, B256};
use bitcoin::{Amount, Txid};
use wbtc_bridge_primitives::redeem::RedeemOutpoint;

/// Intake messages for the state-apply task. One enum, one channel: the
/// per-event rules run strictly in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// The synchronizer finished ingesting a destination-chain height.
    NewFinalizedBlock { chain: &'static str, number: u64 },

    /// The BTC monitor classified a deposit.
    MintObserved {
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
    },

    /// The destination chain emitted `Minted`.
    MintedEvent {
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
        mint_tx_hash: B256,
    },

    /// The destination chain emitted `RedeemRequested`.
    RedeemRequested {
        request_tx_hash: B256,
        requester: Address,
        amount: Amount,
        receiver: String,
    },

    /// The destination chain emitted `RedeemPrepared`.
    RedeemPrepared {
        request_tx_hash: B256,
        prepare_tx_hash: B256,
        requester: Address,
        amount: Amount,
        outpoints: Vec<RedeemOutpoint>,
    },

    /// The BTC monitor observed the payout for a prepared redeem.
    RedeemCompleted {
        request_tx_hash: B256,
        btc_tx_id: Txid,
    },
}
