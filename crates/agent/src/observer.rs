//! Publish/subscribe hub between the BTC monitor and its consumers, plus the
//! three standard observers (vault intake, mint intake, redeem completion).

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wbtc_bridge_db::{
    actions::{ActionDb, DepositActionRecord, RedeemActionRecord},
    vault::VaultDb,
};
use wbtc_bridge_primitives::actions::{
    DepositAction, ObservedUtxo, OtherTransferAction, RedeemAction,
};
use wbtc_bridge_state::StateHandle;

/// Fanout lists, one per event kind. Delivery is a non-blocking `try_send`;
/// a full sink is completed from a detached task, so a slow observer can fall
/// behind other sinks but still sees its own events.
#[derive(Debug, Default)]
pub struct ObserverHub {
    deposit_sinks: Vec<mpsc::Sender<DepositAction>>,
    redeem_sinks: Vec<mpsc::Sender<RedeemAction>>,
    other_sinks: Vec<mpsc::Sender<OtherTransferAction>>,
    utxo_sinks: Vec<mpsc::Sender<ObservedUtxo>>,
}

fn fanout<T: std::fmt::Debug + Clone + Send + 'static>(
    sinks: &[mpsc::Sender<T>],
    event: &T,
) {
    for sink in sinks {
        match sink.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!(?event, "sink full, draining in background");
                let sink = sink.clone();
                tokio::spawn(async move {
                    let _ = sink.send(event).await;
                });
            }
            Err(TrySendError::Closed(event)) => {
                warn!(?event, "dropping event for closed sink");
            }
        }
    }
}

impl ObserverHub {
    pub fn subscribe_deposits(&mut self, queue_size: usize) -> mpsc::Receiver<DepositAction> {
        let (tx, rx) = mpsc::channel(queue_size);
        self.deposit_sinks.push(tx);
        rx
    }

    pub fn subscribe_redeems(&mut self, queue_size: usize) -> mpsc::Receiver<RedeemAction> {
        let (tx, rx) = mpsc::channel(queue_size);
        self.redeem_sinks.push(tx);
        rx
    }

    pub fn subscribe_other_transfers(
        &mut self,
        queue_size: usize,
    ) -> mpsc::Receiver<OtherTransferAction> {
        let (tx, rx) = mpsc::channel(queue_size);
        self.other_sinks.push(tx);
        rx
    }

    pub fn subscribe_utxos(&mut self, queue_size: usize) -> mpsc::Receiver<ObservedUtxo> {
        let (tx, rx) = mpsc::channel(queue_size);
        self.utxo_sinks.push(tx);
        rx
    }

    pub fn notify_deposit(&self, action: &DepositAction) {
        fanout(&self.deposit_sinks, action);
    }

    pub fn notify_redeem(&self, action: &RedeemAction) {
        fanout(&self.redeem_sinks, action);
    }

    pub fn notify_other_transfer(&self, action: &OtherTransferAction) {
        fanout(&self.other_sinks, action);
    }

    pub fn notify_utxo(&self, utxo: &ObservedUtxo) {
        fanout(&self.utxo_sinks, utxo);
    }
}

/// Feeds observed bridge-owned outputs into the vault.
pub struct VaultObserver {
    vault: Arc<dyn VaultDb + Send + Sync>,
    utxos: mpsc::Receiver<ObservedUtxo>,
}

impl VaultObserver {
    pub fn new(
        vault: Arc<dyn VaultDb + Send + Sync>,
        utxos: mpsc::Receiver<ObservedUtxo>,
    ) -> Self {
        Self { vault, utxos }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(action = "starting vault observer");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_utxo = self.utxos.recv() => {
                    let Some(utxo) = maybe_utxo else { break };

                    match self.vault.add_utxo(&utxo).await {
                        Ok(true) => {
                            info!(event = "utxo stored", txid = %utxo.txid, vout = utxo.vout, amount = %utxo.amount);
                        }
                        Ok(false) => {
                            debug!(event = "utxo already known", txid = %utxo.txid, vout = utxo.vout);
                        }
                        Err(e) => {
                            error!(%e, txid = %utxo.txid, "could not store utxo");
                        }
                    }
                }
            }
        }
    }
}

/// Turns observed deposits into pending mints and diagnostic action rows.
pub struct MintObserver {
    state: StateHandle,
    actions: Arc<dyn ActionDb + Send + Sync>,
    bridge_address: String,
    deposits: mpsc::Receiver<DepositAction>,
}

impl MintObserver {
    pub fn new(
        state: StateHandle,
        actions: Arc<dyn ActionDb + Send + Sync>,
        bridge_address: String,
        deposits: mpsc::Receiver<DepositAction>,
    ) -> Self {
        Self {
            state,
            actions,
            bridge_address,
            deposits,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(action = "starting mint observer");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_action = self.deposits.recv() => {
                    let Some(action) = maybe_action else { break };

                    self.state
                        .new_mint_observed(action.tx_hash, action.receiver, action.deposit_value)
                        .await;

                    let record = DepositActionRecord {
                        tx_hash: action.tx_hash,
                        block_number: action.block_number,
                        block_hash: action.block_hash,
                        deposit_value: action.deposit_value,
                        deposit_receiver: self.bridge_address.clone(),
                        change_value: action.change.as_ref().map(|(value, _)| *value),
                        change_receiver: action
                            .change
                            .as_ref()
                            .map(|(_, script)| script.to_hex_string()),
                        evm_id: action.chain_id,
                        evm_addr: action.receiver,
                    };

                    if let Err(e) = self.actions.insert_deposit_action(&record).await {
                        error!(%e, tx_hash = %action.tx_hash, "could not record deposit action");
                    }
                }
            }
        }
    }
}

/// Completes redeems whose payout was observed on BTC.
pub struct RedeemObserver {
    state: StateHandle,
    actions: Arc<dyn ActionDb + Send + Sync>,
    redeems: mpsc::Receiver<RedeemAction>,
}

impl RedeemObserver {
    pub fn new(
        state: StateHandle,
        actions: Arc<dyn ActionDb + Send + Sync>,
        redeems: mpsc::Receiver<RedeemAction>,
    ) -> Self {
        Self {
            state,
            actions,
            redeems,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(action = "starting redeem observer");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_action = self.redeems.recv() => {
                    let Some(action) = maybe_action else { break };

                    self.state
                        .new_redeem_completed(action.request_tx_hash, action.tx_hash)
                        .await;

                    if let Err(e) = self
                        .actions
                        .mark_redeem_action_mined(
                            action.request_tx_hash,
                            action.block_number,
                            action.block_hash,
                        )
                        .await
                    {
                        error!(%e, request_tx_hash = %action.request_tx_hash, "could not mark redeem action mined");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, Amount, BlockHash, ScriptBuf, Txid};
    use wbtc_bridge_primitives::scripts::ScriptKind;

    use super::*;

    fn utxo(n: u8) -> ObservedUtxo {
        ObservedUtxo {
            block_height: n as u64,
            block_hash: BlockHash::from_byte_array([0u8; 32]),
            txid: Txid::from_byte_array([n; 32]),
            vout: 0,
            amount: Amount::from_sat(1_000),
            pk_script: ScriptBuf::new(),
            kind: ScriptKind::P2wpkh,
        }
    }

    #[tokio::test]
    async fn delivery_preserves_per_sink_order() {
        let mut hub = ObserverHub::default();
        let mut rx = hub.subscribe_utxos(16);

        for n in 1..=5 {
            hub.notify_utxo(&utxo(n));
        }

        for n in 1..=5u8 {
            let got = rx.recv().await.unwrap();
            assert_eq!(got.txid, Txid::from_byte_array([n; 32]));
        }
    }

    #[tokio::test]
    async fn full_sink_is_drained_in_background() {
        let mut hub = ObserverHub::default();
        let mut rx = hub.subscribe_utxos(1);

        hub.notify_utxo(&utxo(1));
        hub.notify_utxo(&utxo(2)); // overflows into a detached send

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.txid, Txid::from_byte_array([1u8; 32]));
        assert_eq!(second.txid, Txid::from_byte_array([2u8; 32]));
    }

    #[tokio::test]
    async fn sinks_are_independent() {
        let mut hub = ObserverHub::default();
        let mut fast = hub.subscribe_utxos(16);
        let _slow = hub.subscribe_utxos(1);

        hub.notify_utxo(&utxo(1));
        hub.notify_utxo(&utxo(2));
        hub.notify_utxo(&utxo(3));

        // the fast sink got everything even though the slow one overflowed
        for n in 1..=3u8 {
            assert_eq!(
                fast.recv().await.unwrap().txid,
                Txid::from_byte_array([n; 32])
            );
        }
    }
}
