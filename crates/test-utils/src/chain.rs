use std::collections::{BTreeMap, HashMap, HashSet};

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use tokio::sync::Mutex;
use wbtc_bridge_chain::{
    error::{ChainError, ChainResult},
    events::ChainEvent,
    traits::ChainClient,
    types::{BlockRef, MintCall, PrepareCall, TxReceipt},
};

/// Fully scripted destination chain. Tests arrange blocks, events and
/// predicates; submissions are recorded and handed deterministic tx hashes.
#[derive(Debug, Default)]
pub struct MockChainClient {
    inner: Mutex<MockChainState>,
}

#[derive(Debug, Default)]
struct MockChainState {
    finalized: Option<BlockRef>,
    current: Option<BlockRef>,
    hashes: HashMap<u64, B256>,
    events: BTreeMap<u64, Vec<ChainEvent>>,
    minted: HashSet<B256>,
    prepared: HashSet<B256>,
    receipts: HashMap<B256, TxReceipt>,
    submitted_mints: Vec<(B256, MintCall)>,
    submitted_prepares: Vec<(B256, PrepareCall)>,
    next_tx: u64,
}

impl MockChainClient {
    pub async fn set_finalized(&self, block: BlockRef) {
        let mut inner = self.inner.lock().await;
        inner.hashes.insert(block.number, block.hash);
        inner.finalized = Some(block);
        if inner.current.is_none() {
            inner.current = Some(block);
        }
    }

    pub async fn set_current(&self, block: BlockRef) {
        let mut inner = self.inner.lock().await;
        inner.hashes.insert(block.number, block.hash);
        inner.current = Some(block);
    }

    /// Replace the canonical hash at a height, simulating a reorg.
    pub async fn reorg_height(&self, number: u64, new_hash: B256) {
        self.inner.lock().await.hashes.insert(number, new_hash);
    }

    pub async fn push_event(&self, event: ChainEvent) {
        let mut inner = self.inner.lock().await;
        inner.hashes.insert(event.block_number, event.block_hash);
        inner
            .events
            .entry(event.block_number)
            .or_default()
            .push(event);
    }

    pub async fn mark_minted(&self, btc_tx_id: B256) {
        self.inner.lock().await.minted.insert(btc_tx_id);
    }

    pub async fn mark_prepared(&self, request_tx_hash: B256) {
        self.inner.lock().await.prepared.insert(request_tx_hash);
    }

    pub async fn push_receipt(&self, receipt: TxReceipt) {
        self.inner.lock().await.receipts.insert(receipt.tx_hash, receipt);
    }

    pub async fn submitted_mints(&self) -> Vec<(B256, MintCall)> {
        self.inner.lock().await.submitted_mints.clone()
    }

    pub async fn submitted_prepares(&self) -> Vec<(B256, PrepareCall)> {
        self.inner.lock().await.submitted_prepares.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn finalized_block(&self) -> ChainResult<BlockRef> {
        self.inner
            .lock()
            .await
            .finalized
            .ok_or(ChainError::NotFound)
    }

    async fn current_block(&self) -> ChainResult<BlockRef> {
        self.inner.lock().await.current.ok_or(ChainError::NotFound)
    }

    async fn block_hash_at(&self, number: u64) -> ChainResult<Option<B256>> {
        Ok(self.inner.lock().await.hashes.get(&number).copied())
    }

    async fn events_in_range(&self, from: u64, to: u64) -> ChainResult<Vec<ChainEvent>> {
        Ok(self
            .inner
            .lock()
            .await
            .events
            .range(from + 1..=to)
            .flat_map(|(_, events)| events.clone())
            .collect())
    }

    async fn is_minted(&self, btc_tx_id: B256) -> ChainResult<bool> {
        Ok(self.inner.lock().await.minted.contains(&btc_tx_id))
    }

    async fn is_prepared(&self, request_tx_hash: B256) -> ChainResult<bool> {
        Ok(self.inner.lock().await.prepared.contains(&request_tx_hash))
    }

    async fn submit_mint(&self, call: &MintCall) -> ChainResult<B256> {
        let mut inner = self.inner.lock().await;
        inner.next_tx += 1;
        let tx_hash = B256::from(U256::from(0x1000_0000u64 + inner.next_tx));
        inner.submitted_mints.push((tx_hash, *call));
        Ok(tx_hash)
    }

    async fn submit_redeem_prepare(&self, call: &PrepareCall) -> ChainResult<B256> {
        let mut inner = self.inner.lock().await;
        inner.next_tx += 1;
        let tx_hash = B256::from(U256::from(0x2000_0000u64 + inner.next_tx));
        inner.submitted_prepares.push((tx_hash, call.clone()));
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: B256) -> ChainResult<Option<TxReceipt>> {
        Ok(self.inner.lock().await.receipts.get(&tx_hash).copied())
    }
}
