//! Polls destination-chain finality and forwards bridge events into the
//! state machine in emission order.

use std::{sync::Arc, time::Duration};

use alloy_primitives::U256;
use bitcoin::{hashes::Hash, Amount, Txid};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wbtc_bridge_chain::{
    error::ChainResult,
    events::{ChainEvent, ChainEventKind},
    traits::ChainClient,
    types::BlockRef,
};
use wbtc_bridge_db::state::DEST_CHAIN_KEY;
use wbtc_bridge_primitives::redeem::RedeemOutpoint;
use wbtc_bridge_state::StateHandle;

#[derive(Debug, Clone)]
pub struct ChainSynchronizerConfig {
    pub poll_interval: Duration,

    /// Cursor used when nothing is stored yet.
    pub start_height: u64,

    /// How far to rewind when a previously reported block hash changes.
    pub confirmation_window: u64,
}

/// The destination-chain synchronizer. Ingestion downstream is idempotent, so
/// a reorg rewind simply re-emits a window of events.
pub struct ChainSynchronizer<C> {
    client: Arc<C>,
    config: ChainSynchronizerConfig,
    state: StateHandle,
    last_reported: Option<BlockRef>,
}

impl<C> ChainSynchronizer<C>
where
    C: ChainClient + 'static,
{
    pub fn new(client: Arc<C>, config: ChainSynchronizerConfig, state: StateHandle) -> Self {
        Self {
            client,
            config,
            state,
            last_reported: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(action = "starting chain synchronizer");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(event = "chain synchronizer cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.tick().await {
                        warn!(%e, "chain sync tick aborted");
                    }
                }
            }
        }
    }

    pub async fn tick(&mut self) -> ChainResult<()> {
        let finalized = self.client.finalized_block().await?;

        let stored = self
            .state
            .finalized_block_number(DEST_CHAIN_KEY)
            .await
            .unwrap_or(None)
            .unwrap_or(self.config.start_height);

        let mut from = stored;

        if let Some(prev) = self.last_reported {
            let canonical = self.client.block_hash_at(prev.number).await?;
            if canonical != Some(prev.hash) {
                from = stored.saturating_sub(self.config.confirmation_window);
                warn!(
                    rewound_to = %from,
                    reorged_height = %prev.number,
                    "destination chain reorged, re-emitting window"
                );
            }
        }

        if finalized.number <= from {
            return Ok(());
        }

        let events = self.client.events_in_range(from, finalized.number).await?;
        let num_events = events.len();

        for event in events {
            self.forward(event).await;
        }

        debug!(event = "events ingested", %num_events, from = %from, to = %finalized.number);

        // only persisted once the whole range went through
        self.state
            .new_finalized_block(DEST_CHAIN_KEY, finalized.number)
            .await;
        self.last_reported = Some(finalized);

        Ok(())
    }

    async fn forward(&self, event: ChainEvent) {
        match event.kind {
            ChainEventKind::Minted {
                btc_tx_id,
                receiver,
                amount,
            } => {
                let Some(amount) = to_sats(amount) else {
                    error!(tx_hash = %event.tx_hash, "minted amount overflows, skipping event");
                    return;
                };

                self.state
                    .new_minted_event(
                        Txid::from_byte_array(btc_tx_id.0),
                        receiver,
                        amount,
                        event.tx_hash,
                    )
                    .await;
            }

            ChainEventKind::RedeemRequested {
                requester,
                amount,
                receiver,
            } => {
                let Some(amount) = to_sats(amount) else {
                    error!(tx_hash = %event.tx_hash, "redeem amount overflows, skipping event");
                    return;
                };

                self.state
                    .new_redeem_requested(event.tx_hash, requester, amount, receiver)
                    .await;
            }

            ChainEventKind::RedeemPrepared {
                request_tx_hash,
                requester,
                amount,
                outpoint_tx_ids,
                outpoint_idxs,
            } => {
                let Some(amount) = to_sats(amount) else {
                    error!(tx_hash = %event.tx_hash, "prepared amount overflows, skipping event");
                    return;
                };

                if outpoint_tx_ids.len() != outpoint_idxs.len() {
                    error!(
                        %request_tx_hash,
                        tx_ids = outpoint_tx_ids.len(),
                        idxs = outpoint_idxs.len(),
                        "outpoint arrays disagree, skipping event"
                    );
                    return;
                }

                let outpoints = outpoint_tx_ids
                    .iter()
                    .zip(outpoint_idxs)
                    .map(|(tx_id, idx)| RedeemOutpoint::new(Txid::from_byte_array(tx_id.0), idx))
                    .collect();

                self.state
                    .new_redeem_prepared(
                        request_tx_hash,
                        event.tx_hash,
                        requester,
                        amount,
                        outpoints,
                    )
                    .await;
            }
        }
    }
}

fn to_sats(amount: U256) -> Option<Amount> {
    u64::try_from(amount).ok().map(Amount::from_sat)
}
