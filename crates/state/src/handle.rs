use std::sync::Arc;

use alloy_primitives::{Address, B256};
use bitcoin::{Amount, Network, Txid};
use tokio::sync::mpsc;
use wbtc_bridge_db::{
    errors::DbResult,
    state::{MintRecord, RedeemRecord, StateDb},
};
use wbtc_bridge_primitives::redeem::RedeemOutpoint;

use crate::{apply::StateApplier, event::StateEvent};

/// Shared front door to the state machine. Writes are enqueued to the single
/// apply task; reads go straight to the store.
#[derive(Clone)]
pub struct StateHandle {
    db: Arc<dyn StateDb + Send + Sync>,
    events: mpsc::Sender<StateEvent>,
}

impl StateHandle {
    /// Build the handle and its applier. The caller spawns
    /// [`StateApplier::run`] on its task set.
    pub fn new(
        db: Arc<dyn StateDb + Send + Sync>,
        network: Network,
        queue_size: usize,
    ) -> (Self, StateApplier) {
        let (events, intake) = mpsc::channel(queue_size);
        let applier = StateApplier::new(db.clone(), network, intake);

        (Self { db, events }, applier)
    }

    async fn send(&self, event: StateEvent) {
        // the applier outlives every producer; a send only fails at shutdown
        let _ = self.events.send(event).await;
    }

    pub async fn new_finalized_block(&self, chain: &'static str, number: u64) {
        self.send(StateEvent::NewFinalizedBlock { chain, number })
            .await;
    }

    pub async fn new_mint_observed(&self, btc_tx_id: Txid, receiver: Address, amount: Amount) {
        self.send(StateEvent::MintObserved {
            btc_tx_id,
            receiver,
            amount,
        })
        .await;
    }

    pub async fn new_minted_event(
        &self,
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
        mint_tx_hash: B256,
    ) {
        self.send(StateEvent::MintedEvent {
            btc_tx_id,
            receiver,
            amount,
            mint_tx_hash,
        })
        .await;
    }

    pub async fn new_redeem_requested(
        &self,
        request_tx_hash: B256,
        requester: Address,
        amount: Amount,
        receiver: String,
    ) {
        self.send(StateEvent::RedeemRequested {
            request_tx_hash,
            requester,
            amount,
            receiver,
        })
        .await;
    }

    pub async fn new_redeem_prepared(
        &self,
        request_tx_hash: B256,
        prepare_tx_hash: B256,
        requester: Address,
        amount: Amount,
        outpoints: Vec<RedeemOutpoint>,
    ) {
        self.send(StateEvent::RedeemPrepared {
            request_tx_hash,
            prepare_tx_hash,
            requester,
            amount,
            outpoints,
        })
        .await;
    }

    pub async fn new_redeem_completed(&self, request_tx_hash: B256, btc_tx_id: Txid) {
        self.send(StateEvent::RedeemCompleted {
            request_tx_hash,
            btc_tx_id,
        })
        .await;
    }

    pub async fn pending_mints(&self) -> DbResult<Vec<MintRecord>> {
        self.db.pending_mints().await
    }

    pub async fn get_mint_by_btc_tx_id(&self, btc_tx_id: Txid) -> DbResult<Option<MintRecord>> {
        self.db.get_mint(btc_tx_id).await
    }

    pub async fn requested_redeems(&self) -> DbResult<Vec<RedeemRecord>> {
        self.db.requested_redeems().await
    }

    pub async fn prepared_redeems(&self) -> DbResult<Vec<RedeemRecord>> {
        self.db.prepared_redeems().await
    }

    pub async fn get_by_request_hash(&self, request_tx_hash: B256) -> DbResult<Option<RedeemRecord>> {
        self.db.get_redeem(request_tx_hash).await
    }

    pub async fn finalized_block_number(&self, chain: &str) -> DbResult<Option<u64>> {
        self.db.finalized_block_number(chain).await
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;
    use wbtc_bridge_db::inmemory::MemoryState;

    use super::*;

    #[tokio::test]
    async fn intake_preserves_emission_order() {
        let db = Arc::new(MemoryState::default());
        let (handle, applier) = StateHandle::new(db, Network::Testnet, 16);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(applier.run(cancel.clone()));

        let request = B256::repeat_byte(1);
        handle
            .new_redeem_requested(
                request,
                Address::repeat_byte(2),
                Amount::from_sat(1_000),
                "moHYHpgk4YgTCeLBmDE2teQ3qVLUtM95Fn".to_string(),
            )
            .await;
        handle
            .new_redeem_prepared(
                request,
                B256::repeat_byte(3),
                Address::repeat_byte(2),
                Amount::from_sat(1_000),
                vec![],
            )
            .await;

        // drain the queue
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let record = handle.get_by_request_hash(request).await.unwrap().unwrap();
        assert_eq!(
            record.status,
            wbtc_bridge_db::state::RedeemStatus::Prepared
        );

        cancel.cancel();
        task.await.unwrap();
    }
}
