use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use bitcoin::{Amount, BlockHash, Txid};

use crate::errors::DbResult;

/// Diagnostic record of an observed deposit, indexed for support queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositActionRecord {
    pub tx_hash: Txid,
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub deposit_value: Amount,

    /// The bridge address string the deposit paid to.
    pub deposit_receiver: String,

    pub change_value: Option<Amount>,
    pub change_receiver: Option<String>,
    pub evm_id: u32,
    pub evm_addr: Address,
}

/// Tracker row for a broadcast BTC payout; keyed by the originating
/// destination-chain request so a redeem is never paid twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemActionRecord {
    pub eth_request_tx_id: B256,
    pub btc_hash: Txid,
    pub block_number: Option<u64>,
    pub block_hash: Option<BlockHash>,
    pub sent: bool,
    pub mined: bool,
}

#[async_trait]
pub trait ActionDb {
    /// Idempotent on `tx_hash`; returns `false` when already recorded.
    async fn insert_deposit_action(&self, action: &DepositActionRecord) -> DbResult<bool>;

    async fn insert_redeem_action(&self, action: &RedeemActionRecord) -> DbResult<()>;

    async fn get_redeem_action(
        &self,
        eth_request_tx_id: B256,
    ) -> DbResult<Option<RedeemActionRecord>>;

    /// Record that the payout was seen in a finalized block.
    async fn mark_redeem_action_mined(
        &self,
        eth_request_tx_id: B256,
        block_number: u64,
        block_hash: BlockHash,
    ) -> DbResult<()>;
}
