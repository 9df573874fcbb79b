use async_trait::async_trait;
use bitcoin::{Block, BlockHash, Network, Transaction, Txid};

use crate::{error::ClientResult, types::GetBlockchainInfo};

/// Read-only queries against a Bitcoin node.
#[async_trait]
pub trait Reader {
    async fn get_block(&self, hash: &BlockHash) -> ClientResult<Block>;

    async fn get_block_at(&self, height: u64) -> ClientResult<Block>;

    async fn get_block_count(&self) -> ClientResult<u64>;

    async fn get_block_hash(&self, height: u64) -> ClientResult<BlockHash>;

    async fn get_blockchain_info(&self) -> ClientResult<GetBlockchainInfo>;

    async fn network(&self) -> ClientResult<Network>;
}

/// Transaction submission.
#[async_trait]
pub trait Broadcaster {
    async fn send_raw_transaction(&self, tx: &Transaction) -> ClientResult<Txid>;
}
