use std::collections::BTreeMap;

use async_trait::async_trait;
use bitcoin::{Block, BlockHash, Network, Transaction, Txid};
use tokio::sync::Mutex;
use wbtc_bridge_btcio::{
    error::{ClientError, ClientResult},
    traits::{Broadcaster, Reader},
    types::GetBlockchainInfo,
};

/// A scripted chain of blocks served through the [`Reader`] trait.
#[derive(Debug, Default)]
pub struct MockReader {
    blocks: Mutex<BTreeMap<u64, Block>>,

    /// Heights that fail on fetch, to exercise abort-and-retry ticks.
    broken: Mutex<Vec<u64>>,
}

impl MockReader {
    pub async fn push_block(&self, height: u64, block: Block) {
        self.blocks.lock().await.insert(height, block);
    }

    pub async fn break_height(&self, height: u64) {
        self.broken.lock().await.push(height);
    }

    pub async fn fix_height(&self, height: u64) {
        self.broken.lock().await.retain(|h| *h != height);
    }
}

#[async_trait]
impl Reader for MockReader {
    async fn get_block(&self, hash: &BlockHash) -> ClientResult<Block> {
        self.blocks
            .lock()
            .await
            .values()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or_else(|| ClientError::Server(-5, "Block not found".to_string()))
    }

    async fn get_block_at(&self, height: u64) -> ClientResult<Block> {
        if self.broken.lock().await.contains(&height) {
            return Err(ClientError::Connection("scripted failure".to_string()));
        }

        self.blocks
            .lock()
            .await
            .get(&height)
            .cloned()
            .ok_or_else(|| ClientError::Server(-5, "Block not found".to_string()))
    }

    async fn get_block_count(&self) -> ClientResult<u64> {
        Ok(self.blocks.lock().await.keys().next_back().copied().unwrap_or(0))
    }

    async fn get_block_hash(&self, height: u64) -> ClientResult<BlockHash> {
        Ok(self.get_block_at(height).await?.block_hash())
    }

    async fn get_blockchain_info(&self) -> ClientResult<GetBlockchainInfo> {
        let blocks = self.get_block_count().await?;
        Ok(GetBlockchainInfo {
            chain: "regtest".to_string(),
            blocks,
            best_block_hash: String::new(),
        })
    }

    async fn network(&self) -> ClientResult<Network> {
        Ok(Network::Regtest)
    }
}

/// Records broadcast transactions instead of talking to a node.
#[derive(Debug, Default)]
pub struct MockBroadcaster {
    sent: Mutex<Vec<Transaction>>,
}

impl MockBroadcaster {
    pub async fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn send_raw_transaction(&self, tx: &Transaction) -> ClientResult<Txid> {
        let txid = tx.compute_txid();
        self.sent.lock().await.push(tx.clone());
        Ok(txid)
    }
}
