//! Wire client for the destination-chain adapter service.
//!
//! The deployed contracts (EVM bridge/ERC-20 or the Move module) sit behind a
//! thin adapter daemon exposing this API; the bridge node stays agnostic of
//! ABI encodings and node quirks.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use jsonrpsee::{
    core::RpcResult,
    proc_macros::rpc,
    ws_client::{WsClient, WsClientBuilder},
};
use tracing::trace;

use crate::{
    error::{ChainError, ChainResult},
    events::ChainEvent,
    traits::ChainClient,
    types::{BlockRef, MintCall, PrepareCall, TxReceipt},
};

#[rpc(client, namespace = "bridge")]
pub trait BridgeChainApi {
    #[method(name = "finalizedBlock")]
    async fn finalized_block(&self) -> RpcResult<BlockRef>;

    #[method(name = "currentBlock")]
    async fn current_block(&self) -> RpcResult<BlockRef>;

    #[method(name = "blockHashAt")]
    async fn block_hash_at(&self, number: u64) -> RpcResult<Option<B256>>;

    #[method(name = "eventsInRange")]
    async fn events_in_range(&self, from: u64, to: u64) -> RpcResult<Vec<ChainEvent>>;

    #[method(name = "isMinted")]
    async fn is_minted(&self, btc_tx_id: B256) -> RpcResult<bool>;

    #[method(name = "isPrepared")]
    async fn is_prepared(&self, request_tx_hash: B256) -> RpcResult<bool>;

    #[method(name = "submitMint")]
    async fn submit_mint(&self, call: MintCall) -> RpcResult<B256>;

    #[method(name = "submitRedeemPrepare")]
    async fn submit_redeem_prepare(&self, call: PrepareCall) -> RpcResult<B256>;

    #[method(name = "receipt")]
    async fn receipt(&self, tx_hash: B256) -> RpcResult<Option<TxReceipt>>;

    /// User-side entry point: burn wrapped tokens and name a BTC receiver.
    /// The bridge node never calls this; tooling does.
    #[method(name = "redeemRequest")]
    async fn redeem_request(&self, amount: U256, receiver: String) -> RpcResult<B256>;

    /// Wrapped-token balance, for user-side tooling.
    #[method(name = "balanceOf")]
    async fn balance_of(&self, owner: Address) -> RpcResult<U256>;
}

/// [`ChainClient`] over a websocket connection to the adapter service.
pub struct RpcChainClient {
    client: WsClient,
}

impl RpcChainClient {
    pub async fn connect(url: &str) -> ChainResult<Self> {
        let client = WsClientBuilder::default()
            .build(url)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        trace!(%url, "connected to destination-chain adapter");

        Ok(Self { client })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn finalized_block(&self) -> ChainResult<BlockRef> {
        Ok(BridgeChainApiClient::finalized_block(&self.client).await?)
    }

    async fn current_block(&self) -> ChainResult<BlockRef> {
        Ok(BridgeChainApiClient::current_block(&self.client).await?)
    }

    async fn block_hash_at(&self, number: u64) -> ChainResult<Option<B256>> {
        Ok(BridgeChainApiClient::block_hash_at(&self.client, number).await?)
    }

    async fn events_in_range(&self, from: u64, to: u64) -> ChainResult<Vec<ChainEvent>> {
        Ok(BridgeChainApiClient::events_in_range(&self.client, from, to).await?)
    }

    async fn is_minted(&self, btc_tx_id: B256) -> ChainResult<bool> {
        Ok(BridgeChainApiClient::is_minted(&self.client, btc_tx_id).await?)
    }

    async fn is_prepared(&self, request_tx_hash: B256) -> ChainResult<bool> {
        Ok(BridgeChainApiClient::is_prepared(&self.client, request_tx_hash).await?)
    }

    async fn submit_mint(&self, call: &MintCall) -> ChainResult<B256> {
        Ok(BridgeChainApiClient::submit_mint(&self.client, *call).await?)
    }

    async fn submit_redeem_prepare(&self, call: &PrepareCall) -> ChainResult<B256> {
        Ok(BridgeChainApiClient::submit_redeem_prepare(&self.client, call.clone()).await?)
    }

    async fn receipt(&self, tx_hash: B256) -> ChainResult<Option<TxReceipt>> {
        Ok(BridgeChainApiClient::receipt(&self.client, tx_hash).await?)
    }
}
