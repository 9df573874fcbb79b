//! Builds, signs and broadcasts the BTC payout transaction for every
//! prepared redeem, exactly once per request hash.

use std::{sync::Arc, time::Duration};

use bitcoin::{Network, TxOut};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wbtc_bridge_btcio::{error::ClientError, traits::Broadcaster};
use wbtc_bridge_db::{
    actions::{ActionDb, RedeemActionRecord},
    errors::DbError,
    state::RedeemRecord,
    vault::VaultDb,
};
use wbtc_bridge_primitives::{
    bitcoin::{AddressParseError, BitcoinAddress},
    params::prelude::{BTC_TX_FEE, QUERY_DB_INTERVAL},
};
use wbtc_bridge_state::StateHandle;
use wbtc_bridge_tx_builder::{make_redeem_tx, BuilderError, SpendableUtxo, TxSigner};

#[derive(Debug, Clone)]
pub struct BtcTxManagerConfig {
    pub query_db_interval: Duration,
    pub btc_tx_fee: bitcoin::Amount,
}

impl Default for BtcTxManagerConfig {
    fn default() -> Self {
        Self {
            query_db_interval: QUERY_DB_INTERVAL,
            btc_tx_fee: BTC_TX_FEE,
        }
    }
}

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("receiver unusable: {0}")]
    Receiver(#[from] AddressParseError),

    /// A pledged outpoint is missing from the vault.
    #[error("outpoint {txid}:{vout} not in vault")]
    MissingOutpoint {
        txid: bitcoin::Txid,
        vout: u32,
    },

    #[error(transparent)]
    Build(#[from] BuilderError),

    #[error(transparent)]
    Broadcast(#[from] ClientError),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub struct BtcTxManager<B, S> {
    client: Arc<B>,
    state: StateHandle,
    vault: Arc<dyn VaultDb + Send + Sync>,
    actions: Arc<dyn ActionDb + Send + Sync>,
    signer: Arc<S>,
    change_address: BitcoinAddress,
    network: Network,
    config: BtcTxManagerConfig,
}

impl<B, S> BtcTxManager<B, S>
where
    B: Broadcaster + Send + Sync + 'static,
    S: TxSigner + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<B>,
        state: StateHandle,
        vault: Arc<dyn VaultDb + Send + Sync>,
        actions: Arc<dyn ActionDb + Send + Sync>,
        signer: Arc<S>,
        change_address: BitcoinAddress,
        network: Network,
        config: BtcTxManagerConfig,
    ) -> Self {
        Self {
            client,
            state,
            vault,
            actions,
            signer,
            change_address,
            network,
            config,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(action = "starting btc tx manager");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(event = "btc tx manager cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.config.query_db_interval) => self.tick().await,
            }
        }
    }

    pub async fn tick(&self) {
        let redeems = match self.state.prepared_redeems().await {
            Ok(redeems) => redeems,
            Err(e) => {
                error!(%e, "could not load prepared redeems");
                return;
            }
        };

        for redeem in redeems {
            let request_tx_hash = redeem.request_tx_hash;

            match self.actions.get_redeem_action(request_tx_hash).await {
                Ok(Some(_)) => continue, // already paid out
                Ok(None) => {}
                Err(e) => {
                    error!(%e, %request_tx_hash, "could not check redeem action tracker");
                    continue;
                }
            }

            if let Err(e) = self.pay_out(&redeem).await {
                warn!(%e, %request_tx_hash, "payout attempt failed, will retry");
            }
        }
    }

    async fn pay_out(&self, redeem: &RedeemRecord) -> Result<(), PayoutError> {
        let request_tx_hash = redeem.request_tx_hash;

        let receiver = BitcoinAddress::parse(&redeem.receiver, self.network)?;

        let mut utxos = Vec::with_capacity(redeem.outpoints.len());
        for outpoint in &redeem.outpoints {
            let txid = outpoint.txid();
            let vout = outpoint.vout as u32;

            let utxo = self
                .vault
                .get_utxo(txid, vout)
                .await?
                .ok_or(PayoutError::MissingOutpoint { txid, vout })?;

            utxos.push(SpendableUtxo {
                outpoint: bitcoin::OutPoint { txid, vout },
                value: utxo.amount,
                script_pubkey: utxo.pk_script,
            });
        }

        let mut tx = make_redeem_tx(
            &receiver,
            redeem.amount,
            request_tx_hash,
            &self.change_address,
            self.config.btc_tx_fee,
            &utxos,
        )?;

        let prevouts: Vec<TxOut> = utxos.iter().map(SpendableUtxo::prevout).collect();
        self.signer.sign_all_inputs(&mut tx, &prevouts).await?;

        let btc_hash = self.client.send_raw_transaction(&tx).await?;

        info!(event = "payout broadcast", %request_tx_hash, %btc_hash, amount = %redeem.amount);

        for utxo in &utxos {
            self.vault
                .mark_spent(utxo.outpoint.txid, utxo.outpoint.vout)
                .await?;
        }

        self.actions
            .insert_redeem_action(&RedeemActionRecord {
                eth_request_tx_id: request_tx_hash,
                btc_hash,
                block_number: None,
                block_hash: None,
                sent: true,
                mined: false,
            })
            .await?;

        debug!(%request_tx_hash, "payout tracked; monitor closes the flow");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256};
    use bitcoin::{hashes::Hash, Amount, BlockHash, Txid};
    use wbtc_bridge_db::{
        inmemory::{MemoryActions, MemoryState, MemoryVault},
        state::{RedeemStatus, StateDb},
        vault::UtxoState,
    };
    use wbtc_bridge_primitives::{
        actions::ObservedUtxo, redeem::RedeemOutpoint, scripts::op_return_data,
        scripts::ScriptKind,
    };
    use wbtc_bridge_state::StateHandle;
    use wbtc_bridge_test_utils::{btc::MockBroadcaster, keys::keypair, keys::p2wpkh_address};
    use wbtc_bridge_tx_builder::KeySigner;

    use super::*;

    struct Fixture {
        manager: BtcTxManager<MockBroadcaster, KeySigner>,
        broadcaster: Arc<MockBroadcaster>,
        db: Arc<MemoryState>,
        vault: Arc<MemoryVault>,
        actions: Arc<MemoryActions>,
    }

    fn fixture() -> Fixture {
        let broadcaster = Arc::new(MockBroadcaster::default());
        let db = Arc::new(MemoryState::default());
        let vault = Arc::new(MemoryVault::default());
        let actions = Arc::new(MemoryActions::default());
        let (state, _applier) = StateHandle::new(db.clone(), Network::Regtest, 64);

        let manager = BtcTxManager::new(
            broadcaster.clone(),
            state,
            vault.clone(),
            actions.clone(),
            Arc::new(KeySigner::new(keypair(0xbb))),
            p2wpkh_address(0xcc, Network::Regtest),
            Network::Regtest,
            BtcTxManagerConfig {
                query_db_interval: Duration::from_millis(10),
                btc_tx_fee: Amount::from_sat(10_000),
            },
        );

        Fixture {
            manager,
            broadcaster,
            db,
            vault,
            actions,
        }
    }

    /// A vault utxo locked by the bridge key so the manager can sign it.
    async fn seed_vault_utxo(f: &Fixture, txid_byte: u8, amount: u64) {
        let script = {
            let signer = KeySigner::new(keypair(0xbb));
            let compressed = bitcoin::CompressedPublicKey(signer.public_key());
            bitcoin::ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash())
        };

        f.vault
            .add_utxo(&ObservedUtxo {
                block_height: 1,
                block_hash: BlockHash::from_byte_array([0u8; 32]),
                txid: Txid::from_byte_array([txid_byte; 32]),
                vout: 0,
                amount: Amount::from_sat(amount),
                pk_script: script,
                kind: ScriptKind::P2wpkh,
            })
            .await
            .unwrap();
    }

    fn prepared_redeem(request: B256, amount: u64, outpoints: Vec<RedeemOutpoint>) -> RedeemRecord {
        RedeemRecord {
            request_tx_hash: request,
            prepare_tx_hash: Some(B256::repeat_byte(0xee)),
            btc_tx_id: None,
            requester: Address::repeat_byte(0xaa),
            receiver: p2wpkh_address(0x77, Network::Regtest).to_string(),
            amount: Amount::from_sat(amount),
            outpoints,
            status: RedeemStatus::Prepared,
        }
    }

    #[tokio::test]
    async fn broadcasts_payout_with_expected_shape() {
        let f = fixture();
        seed_vault_utxo(&f, 1, 20_000_000).await;

        let request = B256::repeat_byte(0x12);
        let outpoints = vec![RedeemOutpoint::new(Txid::from_byte_array([1u8; 32]), 0)];
        f.db.insert_redeem(&prepared_redeem(request, 10_000_000, outpoints))
            .await
            .unwrap();

        f.manager.tick().await;

        let sent = f.broadcaster.sent().await;
        assert_eq!(sent.len(), 1);
        let tx = &sent[0];

        assert_eq!(tx.output.len(), 3);
        assert_eq!(tx.output[0].value, Amount::from_sat(10_000_000));
        assert_eq!(
            tx.output[0].script_pubkey,
            p2wpkh_address(0x77, Network::Regtest).script_pubkey()
        );
        assert_eq!(
            op_return_data(&tx.output[1].script_pubkey),
            Some(request.as_slice().to_vec())
        );
        // 20_000_000 - 10_000_000 - 10_000
        assert_eq!(tx.output[2].value, Amount::from_sat(9_990_000));
        assert_eq!(
            tx.output[2].script_pubkey,
            p2wpkh_address(0xcc, Network::Regtest).script_pubkey()
        );

        // input carries a witness
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].witness.len(), 2);

        // spent outpoint and tracked action
        let utxo = f
            .vault
            .get_utxo(Txid::from_byte_array([1u8; 32]), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(utxo.state, UtxoState::Spent);

        let action = f.actions.get_redeem_action(request).await.unwrap().unwrap();
        assert!(action.sent);
        assert!(!action.mined);
        assert_eq!(action.btc_hash, tx.compute_txid());
    }

    #[tokio::test]
    async fn already_tracked_redeem_is_not_paid_twice() {
        let f = fixture();
        seed_vault_utxo(&f, 1, 20_000_000).await;

        let request = B256::repeat_byte(0x13);
        let outpoints = vec![RedeemOutpoint::new(Txid::from_byte_array([1u8; 32]), 0)];
        f.db.insert_redeem(&prepared_redeem(request, 10_000_000, outpoints))
            .await
            .unwrap();

        f.manager.tick().await;
        f.manager.tick().await;

        assert_eq!(f.broadcaster.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn missing_outpoint_leaves_redeem_for_retry() {
        let f = fixture();

        let request = B256::repeat_byte(0x14);
        let outpoints = vec![RedeemOutpoint::new(Txid::from_byte_array([9u8; 32]), 0)];
        f.db.insert_redeem(&prepared_redeem(request, 10_000_000, outpoints))
            .await
            .unwrap();

        f.manager.tick().await;

        assert!(f.broadcaster.sent().await.is_empty());
        assert!(f.actions.get_redeem_action(request).await.unwrap().is_none());
        assert_eq!(
            f.db.get_redeem(request).await.unwrap().unwrap().status,
            RedeemStatus::Prepared
        );
    }

    #[tokio::test]
    async fn receiver_with_stray_prefix_is_normalized() {
        let f = fixture();
        seed_vault_utxo(&f, 1, 20_000_000).await;

        let request = B256::repeat_byte(0x15);
        let outpoints = vec![RedeemOutpoint::new(Txid::from_byte_array([1u8; 32]), 0)];
        let mut redeem = prepared_redeem(request, 10_000_000, outpoints);
        redeem.receiver = format!("0x{}", redeem.receiver);
        f.db.insert_redeem(&redeem).await.unwrap();

        f.manager.tick().await;

        assert_eq!(f.broadcaster.sent().await.len(), 1);
    }
}
