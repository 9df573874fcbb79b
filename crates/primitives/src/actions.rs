//! Events published by the BTC chain monitor to its observers.

use alloy_primitives::{Address, B256};
use bitcoin::{Amount, BlockHash, ScriptBuf, Txid};

use crate::scripts::ScriptKind;

/// A deposit transaction observed in a finalized BTC block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositAction {
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub tx_hash: Txid,
    pub deposit_value: Amount,
    pub chain_id: u32,
    pub receiver: Address,
    pub change: Option<(Amount, ScriptBuf)>,
}

/// A redeem-fulfillment transaction observed in a finalized BTC block, matched
/// to a known redeem by the 32-byte request hash in its null-data output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemAction {
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub tx_hash: Txid,
    pub request_tx_hash: B256,
    pub payout_value: Amount,
}

/// A transfer to the bridge address that matches neither recognized shape.
/// Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherTransferAction {
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub tx_hash: Txid,
    pub value: Amount,
}

/// An output owned by the bridge, destined for the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedUtxo {
    pub block_height: u64,
    pub block_hash: BlockHash,
    pub txid: Txid,
    pub vout: u32,
    pub amount: Amount,
    pub pk_script: ScriptBuf,
    pub kind: ScriptKind,
}
