//! The destination-chain transaction manager: the mint loop, the
//! prepare-redeem loop and the pending-tx monitor, sharing a per-domain-id
//! in-flight set so overlapping ticks never double-submit.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_primitives::{B256, U256};
use bitcoin::{hashes::Hash, Amount, Txid};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wbtc_bridge_chain::{
    error::ChainError,
    traits::ChainClient,
    types::{MintCall, PrepareCall},
};
use wbtc_bridge_db::{
    errors::DbError,
    monitored::{MonitoredTx, MonitoredTxDb, MonitoredTxStatus, TxKind},
    state::{MintRecord, RedeemRecord},
    vault::{Utxo, VaultDb},
};
use wbtc_bridge_primitives::{
    redeem::RedeemOutpoint,
    signing::{mint_signing_hash, prepare_signing_hash},
};
use wbtc_bridge_signer::{SignatureRequest, SignatureResponse, SignerError, ThresholdSigner};
use wbtc_bridge_state::StateHandle;

#[derive(Debug, Clone)]
pub struct ChainTxManagerConfig {
    pub frequency_to_mint: Duration,
    pub frequency_to_prepare_redeem: Duration,
    pub frequency_to_monitor_pending_txs: Duration,
    pub timeout_on_waiting_for_signature: Duration,
    pub timeout_on_waiting_for_outpoints: Duration,

    /// Destination-chain blocks after which a pending tx is re-issued.
    pub timeout_on_monitoring_pending_txs: u64,

    pub reservation_ttl: Duration,
    pub btc_tx_fee: Amount,
}

impl Default for ChainTxManagerConfig {
    fn default() -> Self {
        use wbtc_bridge_primitives::params::prelude::*;

        Self {
            frequency_to_mint: FREQUENCY_TO_MINT,
            frequency_to_prepare_redeem: FREQUENCY_TO_PREPARE_REDEEM,
            frequency_to_monitor_pending_txs: FREQUENCY_TO_MONITOR_PENDING_TXS,
            timeout_on_waiting_for_signature: TIMEOUT_ON_WAITING_FOR_SIGNATURE,
            timeout_on_waiting_for_outpoints: TIMEOUT_ON_WAITING_FOR_OUTPOINTS,
            timeout_on_monitoring_pending_txs: TIMEOUT_ON_MONITORING_PENDING_TXS,
            reservation_ttl: RESERVATION_TTL,
            btc_tx_fee: BTC_TX_FEE,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    /// The redeem cannot be rebuilt (missing row or reservation) for reissue.
    #[error("cannot rebuild submission for {0}")]
    CannotRebuild(B256),
}

/// Domain-id keyed lock set preventing duplicate processing when a tick
/// overlaps the previous one.
#[derive(Debug, Default)]
pub struct InFlightSet(Mutex<HashSet<B256>>);

impl InFlightSet {
    pub fn try_lock(&self, id: B256) -> bool {
        self.0.lock().expect("in-flight lock poisoned").insert(id)
    }

    pub fn unlock(&self, id: B256) {
        self.0.lock().expect("in-flight lock poisoned").remove(&id);
    }
}

pub struct ChainTxManager<C> {
    client: Arc<C>,
    state: StateHandle,
    vault: Arc<dyn VaultDb + Send + Sync>,
    tracker: Arc<dyn MonitoredTxDb + Send + Sync>,
    signer: Arc<dyn ThresholdSigner>,
    config: ChainTxManagerConfig,
    inflight: InFlightSet,
}

impl<C> ChainTxManager<C>
where
    C: ChainClient + 'static,
{
    pub fn new(
        client: Arc<C>,
        state: StateHandle,
        vault: Arc<dyn VaultDb + Send + Sync>,
        tracker: Arc<dyn MonitoredTxDb + Send + Sync>,
        signer: Arc<dyn ThresholdSigner>,
        config: ChainTxManagerConfig,
    ) -> Self {
        Self {
            client,
            state,
            vault,
            tracker,
            signer,
            config,
            inflight: InFlightSet::default(),
        }
    }

    /// Spawn the three loops and wait for them; each finishes its current
    /// tick when cancelled.
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) {
        info!(action = "starting chain tx manager");

        let mut handles = JoinSet::new();

        handles.spawn(self.clone().run_mint_loop(cancel.clone()));
        handles.spawn(self.clone().run_prepare_loop(cancel.clone()));
        handles.spawn(self.run_monitor_loop(cancel));

        handles.join_all().await;
    }

    async fn run_mint_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.frequency_to_mint) => self.mint_tick().await,
            }
        }
    }

    async fn run_prepare_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.frequency_to_prepare_redeem) => {
                    self.prepare_tick().await
                }
            }
        }
    }

    async fn run_monitor_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.frequency_to_monitor_pending_txs) => {
                    self.monitor_tick().await
                }
            }
        }
    }

    // mint loop

    pub async fn mint_tick(&self) {
        let mints = match self.state.pending_mints().await {
            Ok(mints) => mints,
            Err(e) => {
                error!(%e, "could not load pending mints");
                return;
            }
        };

        for mint in mints {
            let id = B256::from(mint.btc_tx_id.to_byte_array());
            if !self.inflight.try_lock(id) {
                continue;
            }

            if let Err(e) = self.process_mint(id, &mint).await {
                warn!(%e, btc_tx_id = %mint.btc_tx_id, "mint attempt failed, will retry");
            }

            self.inflight.unlock(id);
        }
    }

    async fn process_mint(&self, id: B256, mint: &MintRecord) -> Result<(), ManagerError> {
        if self.client.is_minted(id).await? {
            debug!(btc_tx_id = %mint.btc_tx_id, "already minted on chain, waiting for event");
            return Ok(());
        }

        if let Some(pending) = self
            .tracker
            .get_monitored_tx_for(id, TxKind::Mint)
            .await?
        {
            if pending.status == MonitoredTxStatus::Pending {
                debug!(btc_tx_id = %mint.btc_tx_id, "mint already pending");
                return Ok(());
            }
        }

        let amount = mint.amount.to_sat();
        let signing_hash = mint_signing_hash(mint.btc_tx_id, mint.receiver, amount);
        let signature = self.request_signature(id, signing_hash).await?;

        let call = MintCall {
            btc_tx_id: id,
            receiver: mint.receiver,
            amount: U256::from(amount),
            rx: signature.rx,
            s: signature.s,
        };

        let sent_after = self.client.current_block().await?;
        let tx_hash = self.client.submit_mint(&call).await?;

        info!(event = "mint submitted", btc_tx_id = %mint.btc_tx_id, %tx_hash);

        self.tracker
            .insert_monitored_tx(&MonitoredTx {
                tx_hash,
                domain_id: id,
                kind: TxKind::Mint,
                sent_after_block: sent_after.number,
                sent_after_hash: sent_after.hash,
                signing_hash,
                rx: signature.rx,
                s: signature.s,
                mined_at_hash: None,
                status: MonitoredTxStatus::Pending,
            })
            .await?;

        Ok(())
    }

    // prepare-redeem loop

    pub async fn prepare_tick(&self) {
        // lapsed reservations go back to the pool before new ones are taken
        match self.vault.release_expired(chrono::Utc::now().timestamp()).await {
            Ok(0) => {}
            Ok(released) => info!(%released, "released expired reservations"),
            Err(e) => error!(%e, "could not sweep expired reservations"),
        }

        let redeems = match self.state.requested_redeems().await {
            Ok(redeems) => redeems,
            Err(e) => {
                error!(%e, "could not load requested redeems");
                return;
            }
        };

        for redeem in redeems {
            let id = redeem.request_tx_hash;
            if !self.inflight.try_lock(id) {
                continue;
            }

            if let Err(e) = self.process_prepare(&redeem).await {
                warn!(%e, request_tx_hash = %id, "prepare attempt failed, will retry");
            }

            self.inflight.unlock(id);
        }
    }

    async fn process_prepare(&self, redeem: &RedeemRecord) -> Result<(), ManagerError> {
        let id = redeem.request_tx_hash;

        if self.client.is_prepared(id).await? {
            debug!(request_tx_hash = %id, "already prepared on chain, waiting for event");
            return Ok(());
        }

        if let Some(tracked) = self
            .tracker
            .get_monitored_tx_for(id, TxKind::PrepareRedeem)
            .await?
        {
            match tracked.status {
                MonitoredTxStatus::Pending => {
                    debug!(request_tx_hash = %id, "prepare already pending");
                    return Ok(());
                }
                MonitoredTxStatus::Timeout | MonitoredTxStatus::Reorg => {
                    return self.reissue(&tracked).await;
                }
                MonitoredTxStatus::Reverted | MonitoredTxStatus::Malformed => {
                    warn!(request_tx_hash = %id, status = %tracked.status, "prepare rejected on chain, releasing reservation");
                    self.vault.release_reservation(id).await?;
                    return Ok(());
                }
                MonitoredTxStatus::Success | MonitoredTxStatus::Limbo => {
                    debug!(request_tx_hash = %id, status = %tracked.status, "leaving prepare to the synchronizer");
                    return Ok(());
                }
            }
        }

        // reuse an existing reservation (a previous submit may have failed
        // mid-flight), otherwise take a fresh one
        let mut reserved = self.vault.reserved_for(id).await?;
        if reserved.is_empty() {
            let deadline =
                chrono::Utc::now().timestamp() + self.config.reservation_ttl.as_secs() as i64;

            let reservation = tokio::time::timeout(
                self.config.timeout_on_waiting_for_outpoints,
                self.vault
                    .reserve_utxos(id, redeem.amount, self.config.btc_tx_fee, deadline),
            )
            .await;

            reserved = match reservation {
                Ok(Ok(utxos)) => utxos,
                Ok(Err(DbError::InsufficientFunds {
                    available,
                    required,
                })) => {
                    // stays Requested; a future deposit refills the vault
                    debug!(request_tx_hash = %id, %available, %required, "insufficient vault funds");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!(request_tx_hash = %id, "timed out waiting for outpoints");
                    return Ok(());
                }
            };
        }

        let outpoints = to_outpoints(&reserved);
        let signing_hash = prepare_signing_hash(id, redeem.requester, redeem.amount.to_sat(), &outpoints);

        let signature = match self.request_signature(id, signing_hash).await {
            Ok(signature) => signature,
            Err(e) => {
                // a reservation without a signature is useless; free it
                self.vault.release_reservation(id).await?;
                return Err(e);
            }
        };

        let call = prepare_call(redeem, &outpoints, signature.rx, signature.s);

        let sent_after = self.client.current_block().await?;
        let tx_hash = self.client.submit_redeem_prepare(&call).await?;

        info!(event = "prepare submitted", request_tx_hash = %id, %tx_hash, outpoints = outpoints.len());

        self.tracker
            .insert_monitored_tx(&MonitoredTx {
                tx_hash,
                domain_id: id,
                kind: TxKind::PrepareRedeem,
                sent_after_block: sent_after.number,
                sent_after_hash: sent_after.hash,
                signing_hash,
                rx: signature.rx,
                s: signature.s,
                mined_at_hash: None,
                status: MonitoredTxStatus::Pending,
            })
            .await?;

        Ok(())
    }

    // monitor-pending loop

    pub async fn monitor_tick(&self) {
        let pending = match self.tracker.pending_monitored_txs().await {
            Ok(pending) => pending,
            Err(e) => {
                error!(%e, "could not load pending txs");
                return;
            }
        };

        for tracked in pending {
            if let Err(e) = self.check_pending(&tracked).await {
                warn!(%e, tx_hash = %tracked.tx_hash, "pending check failed, will retry");
            }
        }
    }

    async fn check_pending(&self, tracked: &MonitoredTx) -> Result<(), ManagerError> {
        match self.client.receipt(tracked.tx_hash).await {
            Ok(Some(receipt)) => {
                let status = if receipt.success {
                    MonitoredTxStatus::Success
                } else {
                    MonitoredTxStatus::Reverted
                };

                info!(event = "tracked tx mined", tx_hash = %tracked.tx_hash, %status);

                self.tracker
                    .set_monitored_tx_status(tracked.tx_hash, status, Some(receipt.block_hash))
                    .await?;

                if status == MonitoredTxStatus::Reverted
                    && tracked.kind == TxKind::PrepareRedeem
                {
                    self.vault.release_reservation(tracked.domain_id).await?;
                }

                return Ok(());
            }
            Ok(None) => {}
            Err(e) if e == ChainError::NotFound => {}
            Err(e) if e.is_retryable() => return Err(e.into()),
            Err(e) => {
                warn!(%e, tx_hash = %tracked.tx_hash, "node rejected receipt lookup");
                self.tracker
                    .set_monitored_tx_status(tracked.tx_hash, MonitoredTxStatus::Limbo, None)
                    .await?;
                return Ok(());
            }
        }

        // no receipt: reorged out, timed out, or simply not mined yet
        let canonical = self.client.block_hash_at(tracked.sent_after_block).await?;
        if canonical != Some(tracked.sent_after_hash) {
            warn!(tx_hash = %tracked.tx_hash, "sent-after block reorged, re-issuing");

            self.tracker
                .set_monitored_tx_status(tracked.tx_hash, MonitoredTxStatus::Reorg, None)
                .await?;
            return self.reissue(tracked).await;
        }

        let current = self.client.current_block().await?;
        if current.number.saturating_sub(tracked.sent_after_block)
            > self.config.timeout_on_monitoring_pending_txs
        {
            warn!(tx_hash = %tracked.tx_hash, "tx unmined past deadline, re-issuing");

            self.tracker
                .set_monitored_tx_status(tracked.tx_hash, MonitoredTxStatus::Timeout, None)
                .await?;
            return self.reissue(tracked).await;
        }

        Ok(())
    }

    /// Re-submit with the stored signature. Safe because the signed payload
    /// is deterministic in its inputs.
    async fn reissue(&self, tracked: &MonitoredTx) -> Result<(), ManagerError> {
        let tx_hash = match tracked.kind {
            TxKind::Mint => {
                let btc_tx_id = Txid::from_byte_array(tracked.domain_id.0);
                let mint = self
                    .state
                    .get_mint_by_btc_tx_id(btc_tx_id)
                    .await?
                    .ok_or(ManagerError::CannotRebuild(tracked.domain_id))?;

                if mint.mint_tx_hash.is_some() || self.client.is_minted(tracked.domain_id).await? {
                    debug!(%btc_tx_id, "mint landed meanwhile, not re-issuing");
                    return Ok(());
                }

                let call = MintCall {
                    btc_tx_id: tracked.domain_id,
                    receiver: mint.receiver,
                    amount: U256::from(mint.amount.to_sat()),
                    rx: tracked.rx,
                    s: tracked.s,
                };

                self.client.submit_mint(&call).await?
            }
            TxKind::PrepareRedeem => {
                if self.client.is_prepared(tracked.domain_id).await? {
                    debug!(request_tx_hash = %tracked.domain_id, "prepare landed meanwhile, not re-issuing");
                    return Ok(());
                }

                let redeem = self
                    .state
                    .get_by_request_hash(tracked.domain_id)
                    .await?
                    .ok_or(ManagerError::CannotRebuild(tracked.domain_id))?;

                let reserved = self.vault.reserved_for(tracked.domain_id).await?;
                if reserved.is_empty() {
                    return Err(ManagerError::CannotRebuild(tracked.domain_id));
                }

                let outpoints = to_outpoints(&reserved);
                let call = prepare_call(&redeem, &outpoints, tracked.rx, tracked.s);

                self.client.submit_redeem_prepare(&call).await?
            }
        };

        let sent_after = self.client.current_block().await?;

        info!(event = "tx re-issued", old = %tracked.tx_hash, new = %tx_hash);

        self.tracker
            .record_reissue(
                tracked.tx_hash,
                &MonitoredTx {
                    tx_hash,
                    sent_after_block: sent_after.number,
                    sent_after_hash: sent_after.hash,
                    mined_at_hash: None,
                    status: MonitoredTxStatus::Pending,
                    ..tracked.clone()
                },
            )
            .await?;

        Ok(())
    }

    async fn request_signature(
        &self,
        id: B256,
        signing_hash: B256,
    ) -> Result<SignatureResponse, ManagerError> {
        let request = SignatureRequest { id, signing_hash };

        match tokio::time::timeout(
            self.config.timeout_on_waiting_for_signature,
            self.signer.sign_async(request),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SignerError::Timeout.into()),
        }
    }
}

fn to_outpoints(utxos: &[Utxo]) -> Vec<RedeemOutpoint> {
    utxos
        .iter()
        .map(|u| RedeemOutpoint::new(u.txid, u.vout as u16))
        .collect()
}

fn prepare_call(
    redeem: &RedeemRecord,
    outpoints: &[RedeemOutpoint],
    rx: B256,
    s: B256,
) -> PrepareCall {
    PrepareCall {
        request_tx_hash: redeem.request_tx_hash,
        requester: redeem.requester,
        amount: U256::from(redeem.amount.to_sat()),
        outpoint_tx_ids: outpoints
            .iter()
            .map(|o| B256::from(o.txid_bytes()))
            .collect(),
        outpoint_idxs: outpoints.iter().map(|o| o.vout).collect(),
        rx,
        s,
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;
    use async_trait::async_trait;
    use bitcoin::{BlockHash, Network, ScriptBuf};
    use wbtc_bridge_chain::types::BlockRef;
    use wbtc_bridge_db::{
        inmemory::{MemoryState, MemoryTracker, MemoryVault},
        state::{RedeemStatus, StateDb},
        vault::UtxoState,
    };
    use wbtc_bridge_primitives::actions::ObservedUtxo;
    use wbtc_bridge_signer::{LocalSigner, SignerResult};
    use wbtc_bridge_state::StateHandle;
    use wbtc_bridge_test_utils::chain::MockChainClient;

    use super::*;

    struct Fixture {
        manager: ChainTxManager<MockChainClient>,
        client: Arc<MockChainClient>,
        db: Arc<MemoryState>,
        vault: Arc<MemoryVault>,
        tracker: Arc<MemoryTracker>,
    }

    fn config() -> ChainTxManagerConfig {
        ChainTxManagerConfig {
            frequency_to_mint: Duration::from_millis(10),
            frequency_to_prepare_redeem: Duration::from_millis(10),
            frequency_to_monitor_pending_txs: Duration::from_millis(10),
            timeout_on_waiting_for_signature: Duration::from_millis(100),
            timeout_on_waiting_for_outpoints: Duration::from_millis(100),
            timeout_on_monitoring_pending_txs: 20,
            reservation_ttl: Duration::from_secs(300),
            btc_tx_fee: Amount::from_sat(10_000),
        }
    }

    fn fixture_with_signer(signer: Arc<dyn ThresholdSigner>) -> Fixture {
        let client = Arc::new(MockChainClient::default());
        let db = Arc::new(MemoryState::default());
        let vault = Arc::new(MemoryVault::default());
        let tracker = Arc::new(MemoryTracker::default());
        let (state, _applier) = StateHandle::new(db.clone(), Network::Regtest, 64);

        let manager = ChainTxManager::new(
            client.clone(),
            state,
            vault.clone(),
            tracker.clone(),
            signer,
            config(),
        );

        Fixture {
            manager,
            client,
            db,
            vault,
            tracker,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_signer(Arc::new(LocalSigner::random()))
    }

    async fn seed_head(client: &MockChainClient, number: u64) {
        client
            .set_current(BlockRef {
                number,
                hash: B256::repeat_byte(number as u8),
            })
            .await;
    }

    fn observed_utxo(txid_byte: u8, amount: u64) -> ObservedUtxo {
        ObservedUtxo {
            block_height: 1,
            block_hash: BlockHash::from_byte_array([0u8; 32]),
            txid: Txid::from_byte_array([txid_byte; 32]),
            vout: 0,
            amount: Amount::from_sat(amount),
            pk_script: ScriptBuf::new(),
            kind: wbtc_bridge_primitives::scripts::ScriptKind::P2wpkh,
        }
    }

    fn requested_redeem(request: B256, amount: u64) -> RedeemRecord {
        RedeemRecord {
            request_tx_hash: request,
            prepare_tx_hash: None,
            btc_tx_id: None,
            requester: Address::repeat_byte(0xaa),
            receiver: "bcrt1q9h9ys0cq6few5tqm9cwjte5vvam9lsxrh2ce0c".to_string(),
            amount: Amount::from_sat(amount),
            outpoints: vec![],
            status: RedeemStatus::Requested,
        }
    }

    struct StuckSigner;

    #[async_trait]
    impl ThresholdSigner for StuckSigner {
        async fn sign_async(&self, _request: SignatureRequest) -> SignerResult<SignatureResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("the caller times out first")
        }
    }

    #[tokio::test]
    async fn mint_tick_submits_and_tracks() {
        let f = fixture();
        seed_head(&f.client, 100).await;

        let btc_tx_id = Txid::from_byte_array([1u8; 32]);
        f.db.insert_mint(btc_tx_id, Address::repeat_byte(0xda), Amount::from_sat(20_000_000))
            .await
            .unwrap();

        f.manager.mint_tick().await;

        let submitted = f.client.submitted_mints().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].1.amount, U256::from(20_000_000u64));
        assert_eq!(submitted[0].1.receiver, Address::repeat_byte(0xda));

        let pending = f.tracker.pending_monitored_txs().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, TxKind::Mint);
        assert_eq!(pending[0].sent_after_block, 100);

        // second tick sees the pending submission and stays quiet
        f.manager.mint_tick().await;
        assert_eq!(f.client.submitted_mints().await.len(), 1);
    }

    #[tokio::test]
    async fn mint_tick_skips_already_minted() {
        let f = fixture();
        seed_head(&f.client, 100).await;

        let btc_tx_id = Txid::from_byte_array([2u8; 32]);
        f.db.insert_mint(btc_tx_id, Address::repeat_byte(1), Amount::from_sat(5_000))
            .await
            .unwrap();
        f.client
            .mark_minted(B256::from(btc_tx_id.to_byte_array()))
            .await;

        f.manager.mint_tick().await;

        assert!(f.client.submitted_mints().await.is_empty());
        assert!(f.tracker.pending_monitored_txs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prepare_reserves_signs_and_submits() {
        let f = fixture();
        seed_head(&f.client, 50).await;

        f.vault.add_utxo(&observed_utxo(9, 20_000_000)).await.unwrap();

        let request = B256::repeat_byte(0x33);
        f.db.insert_redeem(&requested_redeem(request, 10_000_000))
            .await
            .unwrap();

        f.manager.prepare_tick().await;

        let submitted = f.client.submitted_prepares().await;
        assert_eq!(submitted.len(), 1);
        let call = &submitted[0].1;
        assert_eq!(call.request_tx_hash, request);
        assert_eq!(call.outpoint_tx_ids.len(), 1);
        assert_eq!(call.outpoint_idxs, vec![0]);

        // the utxo is now soft-locked for this redeem
        let reserved = f.vault.reserved_for(request).await.unwrap();
        assert_eq!(reserved.len(), 1);

        // reissue-safe: the signed bytes cover the persisted outpoints
        let tracked = f
            .tracker
            .get_monitored_tx_for(request, TxKind::PrepareRedeem)
            .await
            .unwrap()
            .unwrap();
        let expected = prepare_signing_hash(
            request,
            Address::repeat_byte(0xaa),
            10_000_000,
            &to_outpoints(&reserved),
        );
        assert_eq!(tracked.signing_hash, expected);
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_redeem_requested() {
        let f = fixture();
        seed_head(&f.client, 50).await;

        f.vault.add_utxo(&observed_utxo(1, 1_000)).await.unwrap();
        f.vault.add_utxo(&observed_utxo(2, 1_000)).await.unwrap();

        let request = B256::repeat_byte(0x44);
        f.db.insert_redeem(&requested_redeem(request, 5_000))
            .await
            .unwrap();

        f.manager.prepare_tick().await;

        assert!(f.client.submitted_prepares().await.is_empty());
        assert!(f.tracker.pending_monitored_txs().await.unwrap().is_empty());
        assert_eq!(
            f.db.get_redeem(request).await.unwrap().unwrap().status,
            RedeemStatus::Requested
        );

        // a refill makes the next tick succeed
        f.vault.add_utxo(&observed_utxo(3, 50_000)).await.unwrap();
        f.manager.prepare_tick().await;
        assert_eq!(f.client.submitted_prepares().await.len(), 1);
    }

    #[tokio::test]
    async fn signature_timeout_releases_reservation() {
        let f = fixture_with_signer(Arc::new(StuckSigner));
        seed_head(&f.client, 50).await;

        f.vault.add_utxo(&observed_utxo(7, 20_000_000)).await.unwrap();

        let request = B256::repeat_byte(0x55);
        f.db.insert_redeem(&requested_redeem(request, 10_000_000))
            .await
            .unwrap();

        f.manager.prepare_tick().await;

        assert!(f.client.submitted_prepares().await.is_empty());
        assert!(f.vault.reserved_for(request).await.unwrap().is_empty());

        let utxo = f
            .vault
            .get_utxo(Txid::from_byte_array([7u8; 32]), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(utxo.state, UtxoState::Available);
    }

    #[tokio::test]
    async fn receipt_closes_pending_tx() {
        let f = fixture();
        seed_head(&f.client, 100).await;

        let btc_tx_id = Txid::from_byte_array([3u8; 32]);
        f.db.insert_mint(btc_tx_id, Address::repeat_byte(1), Amount::from_sat(1_000))
            .await
            .unwrap();
        f.manager.mint_tick().await;

        let tracked = f.tracker.pending_monitored_txs().await.unwrap().remove(0);
        f.client
            .push_receipt(wbtc_bridge_chain::types::TxReceipt {
                tx_hash: tracked.tx_hash,
                block_number: 101,
                block_hash: B256::repeat_byte(0x65),
                success: true,
            })
            .await;

        f.manager.monitor_tick().await;

        assert!(f.tracker.pending_monitored_txs().await.unwrap().is_empty());
        let stored = f
            .tracker
            .get_monitored_tx_for(tracked.domain_id, TxKind::Mint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MonitoredTxStatus::Success);
    }

    #[tokio::test]
    async fn reorg_reissues_with_stored_signature() {
        let f = fixture();
        seed_head(&f.client, 100).await;

        let btc_tx_id = Txid::from_byte_array([4u8; 32]);
        f.db.insert_mint(btc_tx_id, Address::repeat_byte(1), Amount::from_sat(9_000))
            .await
            .unwrap();
        f.manager.mint_tick().await;

        let first = f.tracker.pending_monitored_txs().await.unwrap().remove(0);

        // the anchor block disappears from the canonical chain
        f.client
            .reorg_height(first.sent_after_block, B256::repeat_byte(0x99))
            .await;
        seed_head(&f.client, 105).await;

        f.manager.monitor_tick().await;

        let submitted = f.client.submitted_mints().await;
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].1.rx, submitted[1].1.rx);
        assert_eq!(submitted[0].1.s, submitted[1].1.s);

        let latest = f
            .tracker
            .get_monitored_tx_for(first.domain_id, TxKind::Mint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.status, MonitoredTxStatus::Pending);
        assert_ne!(latest.tx_hash, first.tx_hash);
        assert_eq!(latest.sent_after_block, 105);
    }

    #[tokio::test]
    async fn unmined_past_deadline_times_out_and_reissues() {
        let f = fixture();
        seed_head(&f.client, 100).await;

        let btc_tx_id = Txid::from_byte_array([5u8; 32]);
        f.db.insert_mint(btc_tx_id, Address::repeat_byte(1), Amount::from_sat(2_000))
            .await
            .unwrap();
        f.manager.mint_tick().await;

        // far past the monitoring deadline, anchor still canonical
        seed_head(&f.client, 130).await;

        f.manager.monitor_tick().await;

        assert_eq!(f.client.submitted_mints().await.len(), 2);
    }
}
