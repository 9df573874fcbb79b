use std::sync::Arc;

use alloy_primitives::B256;
use bitcoin::Network;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wbtc_bridge_db::{
    errors::DbError,
    state::{RedeemRecord, RedeemStatus, StateDb},
};
use wbtc_bridge_primitives::bitcoin::BitcoinAddress;

use crate::event::StateEvent;

#[derive(Debug, Error)]
pub enum StateError {
    /// A `RedeemPrepared` event arrived for a redeem already ruled invalid.
    #[error("redeem {0} is invalid and cannot be prepared")]
    PreparedInvalidRedeem(B256),

    /// A completion arrived for a redeem that was never prepared.
    #[error("redeem {0} is not prepared")]
    NotPrepared(B256),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// The single owner of the DB writer role. Runs until cancelled or until
/// every [`crate::handle::StateHandle`] is dropped; per-event failures are
/// logged and the loop keeps going so the event source can re-attempt.
pub struct StateApplier {
    db: Arc<dyn StateDb + Send + Sync>,
    network: Network,
    events: mpsc::Receiver<StateEvent>,
}

impl StateApplier {
    pub(crate) fn new(
        db: Arc<dyn StateDb + Send + Sync>,
        network: Network,
        events: mpsc::Receiver<StateEvent>,
    ) -> Self {
        Self {
            db,
            network,
            events,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(action = "starting state applier");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(event = "state applier cancelled");
                    break;
                }
                maybe_event = self.events.recv() => {
                    let Some(event) = maybe_event else {
                        info!(event = "state intake closed");
                        break;
                    };

                    if let Err(e) = self.apply(event).await {
                        error!(%e, "could not apply state event");
                    }
                }
            }
        }
    }

    /// The per-event reconciliation rules. Each arm is atomic with respect to
    /// other events because this task is the only writer.
    pub async fn apply(&self, event: StateEvent) -> Result<(), StateError> {
        match event {
            StateEvent::NewFinalizedBlock { chain, number } => {
                match self.db.set_finalized_block_number(chain, number).await {
                    Ok(()) => {}
                    Err(DbError::FinalizedBlockRegress { stored, new, .. }) => {
                        warn!(%chain, %stored, %new, "ignoring finalized block regress");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            StateEvent::MintObserved {
                btc_tx_id,
                receiver,
                amount,
            } => {
                if self.db.insert_mint(btc_tx_id, receiver, amount).await? {
                    info!(event = "mint recorded", %btc_tx_id, %receiver, %amount);
                } else {
                    debug!(event = "duplicate deposit ignored", %btc_tx_id);
                }
            }

            StateEvent::MintedEvent {
                btc_tx_id,
                receiver,
                amount,
                mint_tx_hash,
            } => {
                self.db
                    .confirm_mint(btc_tx_id, receiver, amount, mint_tx_hash)
                    .await?;
                info!(event = "mint confirmed", %btc_tx_id, %mint_tx_hash);
            }

            StateEvent::RedeemRequested {
                request_tx_hash,
                requester,
                amount,
                receiver,
            } => {
                let status = match BitcoinAddress::parse(&receiver, self.network) {
                    Ok(_) => RedeemStatus::Requested,
                    Err(e) => {
                        warn!(%request_tx_hash, %receiver, %e, "redeem receiver rejected");
                        RedeemStatus::Invalid
                    }
                };

                let inserted = self
                    .db
                    .insert_redeem(&RedeemRecord {
                        request_tx_hash,
                        prepare_tx_hash: None,
                        btc_tx_id: None,
                        requester,
                        receiver,
                        amount,
                        outpoints: vec![],
                        status,
                    })
                    .await?;

                if inserted {
                    info!(event = "redeem recorded", %request_tx_hash, ?status);
                } else {
                    debug!(event = "duplicate redeem request ignored", %request_tx_hash);
                }
            }

            StateEvent::RedeemPrepared {
                request_tx_hash,
                prepare_tx_hash,
                requester,
                amount,
                outpoints,
            } => match self.db.get_redeem(request_tx_hash).await? {
                None => {
                    // prepared observed before the request: backfill directly
                    self.db
                        .insert_redeem(&RedeemRecord {
                            request_tx_hash,
                            prepare_tx_hash: Some(prepare_tx_hash),
                            btc_tx_id: None,
                            requester,
                            receiver: String::new(),
                            amount,
                            outpoints,
                            status: RedeemStatus::Prepared,
                        })
                        .await?;
                    info!(event = "redeem backfilled as prepared", %request_tx_hash);
                }
                Some(record) => match record.status {
                    RedeemStatus::Invalid => {
                        return Err(StateError::PreparedInvalidRedeem(request_tx_hash));
                    }
                    RedeemStatus::Requested => {
                        self.db
                            .set_redeem_prepared(request_tx_hash, prepare_tx_hash, &outpoints)
                            .await?;
                        info!(event = "redeem prepared", %request_tx_hash, %prepare_tx_hash);
                    }
                    RedeemStatus::Prepared | RedeemStatus::Completed => {
                        debug!(event = "duplicate prepare ignored", %request_tx_hash);
                    }
                },
            },

            StateEvent::RedeemCompleted {
                request_tx_hash,
                btc_tx_id,
            } => {
                if self
                    .db
                    .set_redeem_completed(request_tx_hash, btc_tx_id)
                    .await?
                {
                    info!(event = "redeem completed", %request_tx_hash, %btc_tx_id);
                } else {
                    return Err(StateError::NotPrepared(request_tx_hash));
                }
            }
        }

        Ok(())
    }
}
