use alloy_primitives::B256;
use async_trait::async_trait;

use crate::{
    error::ChainResult,
    events::ChainEvent,
    types::{BlockRef, MintCall, PrepareCall, TxReceipt},
};

/// Everything the synchronizer and the destination-chain tx manager need from
/// the chain. Implemented by [`crate::rpc::RpcChainClient`] in production and
/// by mocks in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The latest finalized block.
    async fn finalized_block(&self) -> ChainResult<BlockRef>;

    /// The current head, used as the `sent_after` anchor for submissions.
    async fn current_block(&self) -> ChainResult<BlockRef>;

    /// The canonical hash at a height, `None` when past the head.
    async fn block_hash_at(&self, number: u64) -> ChainResult<Option<B256>>;

    /// Whether the given block position is still on the canonical chain.
    async fn is_canonical(&self, block: &BlockRef) -> ChainResult<bool> {
        Ok(self.block_hash_at(block.number).await? == Some(block.hash))
    }

    /// Bridge events emitted in `(from, to]`, in emission order.
    async fn events_in_range(&self, from: u64, to: u64) -> ChainResult<Vec<ChainEvent>>;

    async fn is_minted(&self, btc_tx_id: B256) -> ChainResult<bool>;

    async fn is_prepared(&self, request_tx_hash: B256) -> ChainResult<bool>;

    /// Submit the mint call; returns the tx hash.
    async fn submit_mint(&self, call: &MintCall) -> ChainResult<B256>;

    /// Submit the prepare call; returns the tx hash.
    async fn submit_redeem_prepare(&self, call: &PrepareCall) -> ChainResult<B256>;

    /// Receipt lookup; `None` while the tx is unmined.
    async fn receipt(&self, tx_hash: B256) -> ChainResult<Option<TxReceipt>>;
}
