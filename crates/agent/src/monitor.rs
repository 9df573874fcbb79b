//! Scans finalized BTC blocks and classifies every transaction as a deposit,
//! a redeem fulfillment or an unrelated transfer to the bridge.

use std::{sync::Arc, time::Duration};

use bitcoin::{Block, ScriptBuf, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wbtc_bridge_btcio::{error::ClientResult, traits::Reader};
use wbtc_bridge_db::state::BTC_CHAIN_KEY;
use wbtc_bridge_primitives::{
    actions::{DepositAction, ObservedUtxo, OtherTransferAction, RedeemAction},
    bitcoin::BitcoinAddress,
    deposit::{extract_deposit, DepositParseError},
    params::prelude::{CONSIDER_FINALIZED, SCAN_INTERVAL},
    redeem::extract_fulfillment,
    scripts::ScriptKind,
};
use wbtc_bridge_state::StateHandle;

use crate::observer::ObserverHub;

#[derive(Debug, Clone)]
pub struct BtcMonitorConfig {
    pub scan_interval: Duration,

    /// Blocks below the tip that are treated as final.
    pub consider_finalized: u64,

    /// First height to scan when no cursor is stored.
    pub start_height: u64,
}

impl Default for BtcMonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval: SCAN_INTERVAL,
            consider_finalized: CONSIDER_FINALIZED,
            start_height: 0,
        }
    }
}

/// The BTC chain monitor. One instance owns the scan cursor.
pub struct BtcMonitor<R> {
    client: Arc<R>,
    config: BtcMonitorConfig,
    bridge_script: ScriptBuf,
    change_script: ScriptBuf,
    state: StateHandle,
    hub: Arc<ObserverHub>,
    last_visited: u64,
}

impl<R> BtcMonitor<R>
where
    R: Reader + Send + Sync + 'static,
{
    pub fn new(
        client: Arc<R>,
        config: BtcMonitorConfig,
        bridge_address: &BitcoinAddress,
        change_address: &BitcoinAddress,
        state: StateHandle,
        hub: Arc<ObserverHub>,
    ) -> Self {
        let last_visited = config.start_height;

        Self {
            client,
            config,
            bridge_script: bridge_address.script_pubkey(),
            change_script: change_address.script_pubkey(),
            state,
            hub,
            last_visited,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(action = "starting btc monitor", start_height = %self.last_visited);

        if let Ok(Some(stored)) = self.state.finalized_block_number(BTC_CHAIN_KEY).await {
            self.last_visited = self.last_visited.max(stored);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(event = "btc monitor cancelled", last_visited = %self.last_visited);
                    break;
                }
                _ = tokio::time::sleep(self.config.scan_interval) => {
                    if let Err(e) = self.tick().await {
                        warn!(%e, last_visited = %self.last_visited, "btc scan tick aborted");
                    }
                }
            }
        }
    }

    /// One scan pass. A failed block fetch aborts the pass; the cursor stays
    /// on the last fully scanned block so the next tick retries.
    pub async fn tick(&mut self) -> ClientResult<()> {
        let tip = self.client.get_block_count().await?;
        let finalized = tip.saturating_sub(self.config.consider_finalized);

        if finalized <= self.last_visited {
            return Ok(());
        }

        for height in self.last_visited + 1..=finalized {
            let block = self.client.get_block_at(height).await?;
            self.scan_block(height, &block).await;

            self.last_visited = height;
            self.state.new_finalized_block(BTC_CHAIN_KEY, height).await;
        }

        debug!(event = "scan caught up", %finalized);

        Ok(())
    }

    async fn scan_block(&self, height: u64, block: &Block) {
        let block_hash = block.block_hash();

        for tx in &block.txdata {
            let txid = tx.compute_txid();

            match extract_deposit(tx, &self.bridge_script) {
                Ok(deposit) => {
                    info!(event = "deposit observed", %txid, %height, value = %deposit.value, receiver = %deposit.payload.receiver);

                    self.hub.notify_utxo(&ObservedUtxo {
                        block_height: height,
                        block_hash,
                        txid,
                        vout: 0,
                        amount: deposit.value,
                        pk_script: self.bridge_script.clone(),
                        kind: ScriptKind::of_script(&self.bridge_script),
                    });

                    self.hub.notify_deposit(&DepositAction {
                        block_number: height,
                        block_hash,
                        tx_hash: txid,
                        deposit_value: deposit.value,
                        chain_id: deposit.payload.chain_id,
                        receiver: deposit.payload.receiver,
                        change: deposit.change,
                    });

                    continue;
                }
                Err(DepositParseError::NotToBridge | DepositParseError::NoOpReturn) => {}
                Err(e) => {
                    // pays the bridge but the payload is unusable
                    warn!(%txid, %e, "skipping malformed deposit payload");
                    continue;
                }
            }

            if let Ok(fulfillment) = extract_fulfillment(tx, &self.change_script) {
                match self
                    .state
                    .get_by_request_hash(fulfillment.request_tx_hash)
                    .await
                {
                    Ok(Some(_)) => {
                        info!(event = "redeem fulfillment observed", %txid, %height, request_tx_hash = %fulfillment.request_tx_hash);

                        self.hub.notify_redeem(&RedeemAction {
                            block_number: height,
                            block_hash,
                            tx_hash: txid,
                            request_tx_hash: fulfillment.request_tx_hash,
                            payout_value: fulfillment.payout_value,
                        });

                        // the change comes back to the vault
                        self.hub.notify_utxo(&ObservedUtxo {
                            block_height: height,
                            block_hash,
                            txid,
                            vout: 2,
                            amount: fulfillment.change_value,
                            pk_script: fulfillment.change_script.clone(),
                            kind: ScriptKind::of_script(&fulfillment.change_script),
                        });

                        continue;
                    }
                    Ok(None) => {
                        debug!(%txid, request_tx_hash = %fulfillment.request_tx_hash, "null-data hash matches no redeem");
                    }
                    Err(e) => {
                        error!(%e, %txid, "could not look up redeem for fulfillment");
                    }
                }
            }

            if let Some(value) = pays_bridge(tx, &self.bridge_script) {
                debug!(event = "unclassified transfer to bridge", %txid, %height);

                self.hub.notify_other_transfer(&OtherTransferAction {
                    block_number: height,
                    block_hash,
                    tx_hash: txid,
                    value,
                });
            }
        }
    }
}

fn pays_bridge(tx: &Transaction, bridge_script: &ScriptBuf) -> Option<bitcoin::Amount> {
    tx.output
        .iter()
        .find(|out| out.script_pubkey == *bridge_script)
        .map(|out| out.value)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256};
    use bitcoin::{Amount, Network};
    use tokio::sync::mpsc;
    use wbtc_bridge_db::{
        inmemory::MemoryState,
        state::{RedeemRecord, RedeemStatus, StateDb},
    };
    use wbtc_bridge_test_utils::{
        btc::MockReader,
        keys::p2wpkh_address,
        tx::{block_with_txs, deposit_tx, fulfillment_tx, transfer_tx},
    };

    use super::*;

    struct Fixture {
        monitor: BtcMonitor<MockReader>,
        reader: Arc<MockReader>,
        db: Arc<MemoryState>,
        deposits: mpsc::Receiver<DepositAction>,
        redeems: mpsc::Receiver<RedeemAction>,
        others: mpsc::Receiver<OtherTransferAction>,
        utxos: mpsc::Receiver<ObservedUtxo>,
    }

    fn fixture() -> Fixture {
        let reader = Arc::new(MockReader::default());
        let db = Arc::new(MemoryState::default());
        let (state, _applier) = StateHandle::new(db.clone(), Network::Regtest, 64);

        let mut hub = ObserverHub::default();
        let deposits = hub.subscribe_deposits(64);
        let redeems = hub.subscribe_redeems(64);
        let others = hub.subscribe_other_transfers(64);
        let utxos = hub.subscribe_utxos(64);

        let monitor = BtcMonitor::new(
            reader.clone(),
            BtcMonitorConfig {
                scan_interval: Duration::from_millis(10),
                consider_finalized: 6,
                start_height: 0,
            },
            &p2wpkh_address(0xb1, Network::Regtest),
            &p2wpkh_address(0xb2, Network::Regtest),
            state,
            Arc::new(hub),
        );

        Fixture {
            monitor,
            reader,
            db,
            deposits,
            redeems,
            others,
            utxos,
        }
    }

    fn bridge_script() -> ScriptBuf {
        p2wpkh_address(0xb1, Network::Regtest).script_pubkey()
    }

    fn change_script() -> ScriptBuf {
        p2wpkh_address(0xb2, Network::Regtest).script_pubkey()
    }

    #[tokio::test]
    async fn deposits_below_finality_are_classified() {
        let mut f = fixture();
        let receiver = Address::repeat_byte(0xda);

        let tx = deposit_tx(
            &bridge_script(),
            Amount::from_sat(20_000_000),
            1337,
            receiver,
            None,
        );
        let txid = tx.compute_txid();

        f.reader.push_block(1, block_with_txs(1, vec![tx])).await;
        for height in 2..=7 {
            f.reader
                .push_block(height, block_with_txs(height, vec![]))
                .await;
        }

        f.monitor.tick().await.unwrap();

        let action = f.deposits.recv().await.unwrap();
        assert_eq!(action.tx_hash, txid);
        assert_eq!(action.block_number, 1);
        assert_eq!(action.receiver, receiver);
        assert_eq!(action.deposit_value, Amount::from_sat(20_000_000));

        let utxo = f.utxos.recv().await.unwrap();
        assert_eq!(utxo.txid, txid);
        assert_eq!(utxo.vout, 0);
    }

    #[tokio::test]
    async fn unfinalized_blocks_wait() {
        let mut f = fixture();

        let tx = deposit_tx(
            &bridge_script(),
            Amount::from_sat(1_000),
            1,
            Address::repeat_byte(1),
            None,
        );
        // the deposit sits at the tip: not final yet
        f.reader.push_block(1, block_with_txs(1, vec![tx])).await;

        f.monitor.tick().await.unwrap();
        assert!(f.deposits.try_recv().is_err());
    }

    #[tokio::test]
    async fn fulfillment_matches_known_redeem_only() {
        let mut f = fixture();
        let known = B256::repeat_byte(0xaa);

        f.db.insert_redeem(&RedeemRecord {
            request_tx_hash: known,
            prepare_tx_hash: Some(B256::repeat_byte(1)),
            btc_tx_id: None,
            requester: Address::repeat_byte(2),
            receiver: String::new(),
            amount: Amount::from_sat(10_000_000),
            outpoints: vec![],
            status: RedeemStatus::Prepared,
        })
        .await
        .unwrap();

        let user_script = p2wpkh_address(0x55, Network::Regtest).script_pubkey();
        let matching = fulfillment_tx(
            &user_script,
            Amount::from_sat(10_000_000),
            known,
            &change_script(),
            Amount::from_sat(9_990_000),
        );
        let unknown = fulfillment_tx(
            &user_script,
            Amount::from_sat(5_000),
            B256::repeat_byte(0xbb),
            &change_script(),
            Amount::from_sat(1_000),
        );

        f.reader
            .push_block(1, block_with_txs(1, vec![matching.clone(), unknown]))
            .await;
        for height in 2..=7 {
            f.reader
                .push_block(height, block_with_txs(height, vec![]))
                .await;
        }

        f.monitor.tick().await.unwrap();

        let action = f.redeems.recv().await.unwrap();
        assert_eq!(action.request_tx_hash, known);
        assert_eq!(action.tx_hash, matching.compute_txid());
        assert!(f.redeems.try_recv().is_err());

        // the change output is fed back to the vault
        let utxo = f.utxos.recv().await.unwrap();
        assert_eq!(utxo.vout, 2);
        assert_eq!(utxo.amount, Amount::from_sat(9_990_000));
    }

    #[tokio::test]
    async fn unrelated_bridge_payments_are_diagnostic() {
        let mut f = fixture();

        let tx = transfer_tx(&bridge_script(), Amount::from_sat(777));
        f.reader.push_block(1, block_with_txs(1, vec![tx])).await;
        for height in 2..=7 {
            f.reader
                .push_block(height, block_with_txs(height, vec![]))
                .await;
        }

        f.monitor.tick().await.unwrap();

        let action = f.others.recv().await.unwrap();
        assert_eq!(action.value, Amount::from_sat(777));
        assert!(f.deposits.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_fetch_aborts_and_resumes() {
        let mut f = fixture();

        let tx = deposit_tx(
            &bridge_script(),
            Amount::from_sat(2_000),
            1,
            Address::repeat_byte(3),
            None,
        );
        f.reader.push_block(1, block_with_txs(1, vec![]))
            .await;
        f.reader.push_block(2, block_with_txs(2, vec![tx])).await;
        for height in 3..=8 {
            f.reader
                .push_block(height, block_with_txs(height, vec![]))
                .await;
        }
        f.reader.break_height(2).await;

        // first tick scans height 1 then aborts on 2
        assert!(f.monitor.tick().await.is_err());
        assert!(f.deposits.try_recv().is_err());

        // retried tick picks up from the same cursor
        f.reader.fix_height(2).await;
        f.monitor.tick().await.unwrap();
        assert_eq!(f.deposits.recv().await.unwrap().block_number, 2);
    }
}
