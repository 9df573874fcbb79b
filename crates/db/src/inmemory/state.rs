use std::collections::{BTreeMap, HashMap};

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use bitcoin::{hashes::Hash, Amount, Txid};
use tokio::sync::RwLock;
use wbtc_bridge_primitives::redeem::RedeemOutpoint;

use crate::{
    errors::{DbError, DbResult},
    state::{MintRecord, RedeemRecord, RedeemStatus, StateDb},
};

#[derive(Debug, Default)]
pub struct MemoryState {
    mints: RwLock<BTreeMap<[u8; 32], MintRecord>>,
    redeems: RwLock<BTreeMap<B256, RedeemRecord>>,
    cursors: RwLock<HashMap<String, u64>>,
}

#[async_trait]
impl StateDb for MemoryState {
    async fn insert_mint(
        &self,
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
    ) -> DbResult<bool> {
        let mut mints = self.mints.write().await;
        let k = btc_tx_id.to_byte_array();

        if mints.contains_key(&k) {
            return Ok(false);
        }

        mints.insert(
            k,
            MintRecord {
                btc_tx_id,
                receiver,
                amount,
                mint_tx_hash: None,
            },
        );

        Ok(true)
    }

    async fn confirm_mint(
        &self,
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
        mint_tx_hash: B256,
    ) -> DbResult<()> {
        let mut mints = self.mints.write().await;

        mints
            .entry(btc_tx_id.to_byte_array())
            .or_insert_with(|| MintRecord {
                btc_tx_id,
                receiver,
                amount,
                mint_tx_hash: None,
            })
            .mint_tx_hash = Some(mint_tx_hash);

        Ok(())
    }

    async fn pending_mints(&self) -> DbResult<Vec<MintRecord>> {
        Ok(self
            .mints
            .read()
            .await
            .values()
            .filter(|m| m.mint_tx_hash.is_none())
            .cloned()
            .collect())
    }

    async fn get_mint(&self, btc_tx_id: Txid) -> DbResult<Option<MintRecord>> {
        Ok(self
            .mints
            .read()
            .await
            .get(&btc_tx_id.to_byte_array())
            .cloned())
    }

    async fn insert_redeem(&self, record: &RedeemRecord) -> DbResult<bool> {
        let mut redeems = self.redeems.write().await;

        if redeems.contains_key(&record.request_tx_hash) {
            return Ok(false);
        }

        redeems.insert(record.request_tx_hash, record.clone());
        Ok(true)
    }

    async fn set_redeem_prepared(
        &self,
        request_tx_hash: B256,
        prepare_tx_hash: B256,
        outpoints: &[RedeemOutpoint],
    ) -> DbResult<bool> {
        let mut redeems = self.redeems.write().await;

        match redeems.get_mut(&request_tx_hash) {
            Some(record) if record.status == RedeemStatus::Requested => {
                record.status = RedeemStatus::Prepared;
                record.prepare_tx_hash = Some(prepare_tx_hash);
                record.outpoints = outpoints.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_redeem_completed(&self, request_tx_hash: B256, btc_tx_id: Txid) -> DbResult<bool> {
        let mut redeems = self.redeems.write().await;

        match redeems.get_mut(&request_tx_hash) {
            Some(record) if record.status == RedeemStatus::Prepared => {
                record.status = RedeemStatus::Completed;
                record.btc_tx_id = Some(btc_tx_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requested_redeems(&self) -> DbResult<Vec<RedeemRecord>> {
        Ok(self
            .redeems
            .read()
            .await
            .values()
            .filter(|r| r.status == RedeemStatus::Requested)
            .cloned()
            .collect())
    }

    async fn prepared_redeems(&self) -> DbResult<Vec<RedeemRecord>> {
        Ok(self
            .redeems
            .read()
            .await
            .values()
            .filter(|r| r.status == RedeemStatus::Prepared)
            .cloned()
            .collect())
    }

    async fn get_redeem(&self, request_tx_hash: B256) -> DbResult<Option<RedeemRecord>> {
        Ok(self.redeems.read().await.get(&request_tx_hash).cloned())
    }

    async fn finalized_block_number(&self, chain: &str) -> DbResult<Option<u64>> {
        Ok(self.cursors.read().await.get(chain).copied())
    }

    async fn set_finalized_block_number(&self, chain: &str, number: u64) -> DbResult<()> {
        let mut cursors = self.cursors.write().await;

        if let Some(&stored) = cursors.get(chain) {
            if number < stored {
                return Err(DbError::FinalizedBlockRegress {
                    chain: chain.to_string(),
                    stored,
                    new: number,
                });
            }
        }

        cursors.insert(chain.to_string(), number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redeem(request: B256, status: RedeemStatus) -> RedeemRecord {
        RedeemRecord {
            request_tx_hash: request,
            prepare_tx_hash: None,
            btc_tx_id: None,
            requester: Address::repeat_byte(1),
            receiver: "moHYHpgk4YgTCeLBmDE2teQ3qVLUtM95Fn".to_string(),
            amount: Amount::from_sat(10_000_000),
            outpoints: vec![],
            status,
        }
    }

    #[tokio::test]
    async fn mint_never_inserted_twice() {
        let db = MemoryState::default();
        let txid = Txid::from_byte_array([1u8; 32]);

        assert!(db
            .insert_mint(txid, Address::repeat_byte(2), Amount::from_sat(1))
            .await
            .unwrap());
        assert!(!db
            .insert_mint(txid, Address::repeat_byte(3), Amount::from_sat(2))
            .await
            .unwrap());

        // original row untouched
        let mint = db.get_mint(txid).await.unwrap().unwrap();
        assert_eq!(mint.receiver, Address::repeat_byte(2));
    }

    #[tokio::test]
    async fn confirm_mint_backfills_missing_row() {
        let db = MemoryState::default();
        let txid = Txid::from_byte_array([4u8; 32]);

        db.confirm_mint(
            txid,
            Address::repeat_byte(2),
            Amount::from_sat(5),
            B256::repeat_byte(9),
        )
        .await
        .unwrap();

        let mint = db.get_mint(txid).await.unwrap().unwrap();
        assert_eq!(mint.mint_tx_hash, Some(B256::repeat_byte(9)));
        assert!(db.pending_mints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn redeem_transitions_are_guarded() {
        let db = MemoryState::default();
        let request = B256::repeat_byte(7);

        // completing a missing row does nothing
        assert!(!db
            .set_redeem_completed(request, Txid::from_byte_array([9u8; 32]))
            .await
            .unwrap());

        assert!(db
            .insert_redeem(&redeem(request, RedeemStatus::Requested))
            .await
            .unwrap());

        // requested -> completed is not allowed
        assert!(!db
            .set_redeem_completed(request, Txid::from_byte_array([9u8; 32]))
            .await
            .unwrap());

        assert!(db
            .set_redeem_prepared(request, B256::repeat_byte(8), &[])
            .await
            .unwrap());

        // prepared twice is a no-op
        assert!(!db
            .set_redeem_prepared(request, B256::repeat_byte(6), &[])
            .await
            .unwrap());

        assert!(db
            .set_redeem_completed(request, Txid::from_byte_array([9u8; 32]))
            .await
            .unwrap());

        let record = db.get_redeem(request).await.unwrap().unwrap();
        assert_eq!(record.status, RedeemStatus::Completed);
        assert_eq!(record.prepare_tx_hash, Some(B256::repeat_byte(8)));
    }

    #[tokio::test]
    async fn invalid_rows_never_transition() {
        let db = MemoryState::default();
        let request = B256::repeat_byte(5);

        db.insert_redeem(&redeem(request, RedeemStatus::Invalid))
            .await
            .unwrap();

        assert!(!db
            .set_redeem_prepared(request, B256::repeat_byte(1), &[])
            .await
            .unwrap());
        assert_eq!(
            db.get_redeem(request).await.unwrap().unwrap().status,
            RedeemStatus::Invalid
        );
    }

    #[tokio::test]
    async fn finalized_cursor_is_monotone() {
        let db = MemoryState::default();

        assert_eq!(db.finalized_block_number("dest").await.unwrap(), None);

        db.set_finalized_block_number("dest", 10).await.unwrap();
        db.set_finalized_block_number("dest", 10).await.unwrap();
        db.set_finalized_block_number("dest", 12).await.unwrap();

        assert!(matches!(
            db.set_finalized_block_number("dest", 11).await,
            Err(DbError::FinalizedBlockRegress { stored: 12, new: 11, .. })
        ));
        assert_eq!(db.finalized_block_number("dest").await.unwrap(), Some(12));
    }
}
