use std::collections::BTreeMap;

use alloy_primitives::B256;
use async_trait::async_trait;
use bitcoin::{hashes::Hash, BlockHash};
use tokio::sync::RwLock;

use crate::{
    actions::{ActionDb, DepositActionRecord, RedeemActionRecord},
    errors::DbResult,
};

#[derive(Debug, Default)]
pub struct MemoryActions {
    deposits: RwLock<BTreeMap<[u8; 32], DepositActionRecord>>,
    redeems: RwLock<BTreeMap<B256, RedeemActionRecord>>,
}

#[async_trait]
impl ActionDb for MemoryActions {
    async fn insert_deposit_action(&self, action: &DepositActionRecord) -> DbResult<bool> {
        let mut deposits = self.deposits.write().await;
        let k = action.tx_hash.to_byte_array();

        if deposits.contains_key(&k) {
            return Ok(false);
        }

        deposits.insert(k, action.clone());
        Ok(true)
    }

    async fn insert_redeem_action(&self, action: &RedeemActionRecord) -> DbResult<()> {
        self.redeems
            .write()
            .await
            .insert(action.eth_request_tx_id, action.clone());
        Ok(())
    }

    async fn get_redeem_action(
        &self,
        eth_request_tx_id: B256,
    ) -> DbResult<Option<RedeemActionRecord>> {
        Ok(self.redeems.read().await.get(&eth_request_tx_id).cloned())
    }

    async fn mark_redeem_action_mined(
        &self,
        eth_request_tx_id: B256,
        block_number: u64,
        block_hash: BlockHash,
    ) -> DbResult<()> {
        let mut redeems = self.redeems.write().await;

        if let Some(action) = redeems.get_mut(&eth_request_tx_id) {
            action.mined = true;
            action.block_number = Some(block_number);
            action.block_hash = Some(block_hash);
        }

        Ok(())
    }
}
