use alloy_primitives::B256;
use async_trait::async_trait;
use bitcoin::{Amount, BlockHash, ScriptBuf, Txid};
use wbtc_bridge_primitives::{actions::ObservedUtxo, scripts::ScriptKind};

use crate::errors::DbResult;

/// Where a vault entry sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtxoState {
    Available,

    /// Soft-locked for a specific prepared redeem until the deadline lapses.
    Reserved {
        request_tx_hash: B256,
        reserved_until: i64,
    },

    Spent,
}

/// An output owned by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub amount: Amount,
    pub pk_script: ScriptBuf,
    pub kind: ScriptKind,
    pub block_height: u64,
    pub block_hash: BlockHash,
    pub state: UtxoState,
}

/// The vault owns its rows exclusively; every other component goes through
/// this interface.
///
/// `reserve_utxos` must pick deterministically: candidates ordered by
/// `(amount asc, block_height asc, txid lexicographic)`, accumulated
/// smallest-first until the sum covers `amount + fee`.
#[async_trait]
pub trait VaultDb {
    /// Insert a newly observed output as `Available`. Idempotent on
    /// `(txid, vout)`; returns `false` when the row already existed.
    async fn add_utxo(&self, utxo: &ObservedUtxo) -> DbResult<bool>;

    /// Atomically select and reserve outputs covering `amount + fee` for the
    /// given redeem. Fails with `InsufficientFunds` when the available set
    /// cannot cover it, leaving nothing reserved.
    async fn reserve_utxos(
        &self,
        request_tx_hash: B256,
        amount: Amount,
        fee: Amount,
        reserved_until: i64,
    ) -> DbResult<Vec<Utxo>>;

    /// Return every output reserved for the given redeem to `Available`.
    /// Returns the number of released outputs.
    async fn release_reservation(&self, request_tx_hash: B256) -> DbResult<u64>;

    /// Return every output whose reservation deadline has lapsed to
    /// `Available`. Returns the number of released outputs.
    async fn release_expired(&self, now: i64) -> DbResult<u64>;

    /// The outputs currently reserved for the given redeem, in selection
    /// order. Used to rebuild a prepare call instead of double-reserving.
    async fn reserved_for(&self, request_tx_hash: B256) -> DbResult<Vec<Utxo>>;

    async fn get_utxo(&self, txid: Txid, vout: u32) -> DbResult<Option<Utxo>>;

    async fn mark_spent(&self, txid: Txid, vout: u32) -> DbResult<()>;
}

/// Order key for deterministic selection.
pub(crate) fn selection_key(utxo: &Utxo) -> (u64, u64, [u8; 32]) {
    use bitcoin::hashes::Hash;

    (
        utxo.amount.to_sat(),
        utxo.block_height,
        utxo.txid.to_byte_array(),
    )
}

/// Smallest-first-fit accumulation shared by both vault implementations.
///
/// Returns the selected prefix, or the total available (in sat) when even the
/// full candidate set cannot cover the target.
pub(crate) fn select_smallest_first(
    mut candidates: Vec<Utxo>,
    target: Amount,
) -> Result<Vec<Utxo>, u64> {
    candidates.sort_by_key(selection_key);

    let mut picked = Vec::new();
    let mut sum = Amount::ZERO;
    for utxo in candidates {
        if sum >= target {
            break;
        }
        sum += utxo.amount;
        picked.push(utxo);
    }

    if sum >= target {
        Ok(picked)
    } else {
        Err(sum.to_sat())
    }
}
