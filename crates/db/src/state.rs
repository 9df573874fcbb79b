use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use bitcoin::{Amount, Txid};
use wbtc_bridge_primitives::redeem::RedeemOutpoint;

use crate::errors::DbResult;

/// Key under which the BTC scan cursor is stored in the `kv` table.
pub const BTC_CHAIN_KEY: &str = "btc";

/// Key under which the destination-chain cursor is stored in the `kv` table.
pub const DEST_CHAIN_KEY: &str = "dest";

/// A wrapped-token mint obligation created by an observed BTC deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRecord {
    pub btc_tx_id: Txid,
    pub receiver: Address,
    pub amount: Amount,

    /// Empty until the destination chain's `Minted` event is ingested.
    pub mint_tx_hash: Option<B256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemStatus {
    Requested,
    Prepared,
    Completed,
    Invalid,
}

impl std::fmt::Display for RedeemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Prepared => write!(f, "prepared"),
            Self::Completed => write!(f, "completed"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

impl std::str::FromStr for RedeemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "prepared" => Ok(Self::Prepared),
            "completed" => Ok(Self::Completed),
            "invalid" => Ok(Self::Invalid),
            other => Err(format!("unknown redeem status: {other}")),
        }
    }
}

/// A burn-to-withdraw flow keyed by the destination-chain request tx hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemRecord {
    pub request_tx_hash: B256,
    pub prepare_tx_hash: Option<B256>,
    pub btc_tx_id: Option<Txid>,
    pub requester: Address,

    /// The user-supplied BTC receiver string, unvalidated for `Invalid` rows.
    pub receiver: String,

    pub amount: Amount,
    pub outpoints: Vec<RedeemOutpoint>,
    pub status: RedeemStatus,
}

/// The mint/redeem reconciliation tables and the per-chain finalized-block
/// cursors. All writes go through the single state-apply task.
#[async_trait]
pub trait StateDb {
    /// Insert a pending mint. Returns `false` (and changes nothing) when a
    /// row with this `btc_tx_id` already exists — a BTC tx never mints twice.
    async fn insert_mint(&self, btc_tx_id: Txid, receiver: Address, amount: Amount)
        -> DbResult<bool>;

    /// Record the on-chain mint tx hash, inserting the row first if the
    /// deposit was never observed locally (destination-chain-only path).
    async fn confirm_mint(
        &self,
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
        mint_tx_hash: B256,
    ) -> DbResult<()>;

    /// Mints with no `mint_tx_hash` yet.
    async fn pending_mints(&self) -> DbResult<Vec<MintRecord>>;

    async fn get_mint(&self, btc_tx_id: Txid) -> DbResult<Option<MintRecord>>;

    /// Insert a redeem row. Returns `false` (and changes nothing) on a
    /// duplicate `request_tx_hash`.
    async fn insert_redeem(&self, record: &RedeemRecord) -> DbResult<bool>;

    /// Guarded transition `Requested` -> `Prepared`, populating the prepare
    /// tx hash and the pledged outpoints. Returns `false` when the row was
    /// not in `Requested`.
    async fn set_redeem_prepared(
        &self,
        request_tx_hash: B256,
        prepare_tx_hash: B256,
        outpoints: &[RedeemOutpoint],
    ) -> DbResult<bool>;

    /// Guarded transition `Prepared` -> `Completed`, recording the BTC payout
    /// txid. Returns `false` when the row was not in `Prepared`.
    async fn set_redeem_completed(&self, request_tx_hash: B256, btc_tx_id: Txid) -> DbResult<bool>;

    async fn requested_redeems(&self) -> DbResult<Vec<RedeemRecord>>;

    async fn prepared_redeems(&self) -> DbResult<Vec<RedeemRecord>>;

    async fn get_redeem(&self, request_tx_hash: B256) -> DbResult<Option<RedeemRecord>>;

    async fn finalized_block_number(&self, chain: &str) -> DbResult<Option<u64>>;

    /// Persist a new finalized-block cursor. Monotone: equal values are
    /// accepted, a regress is rejected with `FinalizedBlockRegress`.
    async fn set_finalized_block_number(&self, chain: &str, number: u64) -> DbResult<()>;
}
