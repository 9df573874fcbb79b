//! Module to bootstrap the bridge node by hooking up all the required
//! services under one cancellable root.

use std::sync::Arc;

use anyhow::{bail, Context};
use secp256k1::{Keypair, PublicKey, SecretKey, XOnlyPublicKey, SECP256K1};
use tokio::{signal, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wbtc_bridge_agent::{
    btc_manager::{BtcTxManager, BtcTxManagerConfig},
    chain_manager::{ChainTxManager, ChainTxManagerConfig},
    monitor::{BtcMonitor, BtcMonitorConfig},
    observer::{MintObserver, ObserverHub, RedeemObserver, VaultObserver},
    synchronizer::{ChainSynchronizer, ChainSynchronizerConfig},
};
use wbtc_bridge_btcio::BitcoinClient;
use wbtc_bridge_chain::RpcChainClient;
use wbtc_bridge_db::{
    actions::ActionDb,
    inmemory::{MemoryActions, MemoryState, MemoryTracker, MemoryVault},
    monitored::MonitoredTxDb,
    state::StateDb,
    vault::VaultDb,
};
use wbtc_bridge_primitives::{
    bitcoin::BitcoinAddress,
    params::prelude::{DEST_CONFIRMATION_WINDOW, FREQUENCY_TO_CHECK_FINALIZED_BLOCK},
};
use wbtc_bridge_signer::{LocalSigner, RemoteSigner, ThresholdSigner};
use wbtc_bridge_state::StateHandle;
use wbtc_bridge_tx_builder::{BridgeSigner, KeySigner, RemoteSchnorrSigner};

use crate::{
    args::{Cli, DbBackend},
    constants::{OBSERVER_QUEUE_SIZE, STATE_QUEUE_SIZE},
    db,
};

struct Stores {
    vault: Arc<dyn VaultDb + Send + Sync>,
    state: Arc<dyn StateDb + Send + Sync>,
    tracker: Arc<dyn MonitoredTxDb + Send + Sync>,
    actions: Arc<dyn ActionDb + Send + Sync>,
}

pub(crate) async fn bootstrap(args: Cli) -> anyhow::Result<()> {
    let network = args.btc_network;

    let bridge_address = BitcoinAddress::parse(&args.bridge_address, network)
        .context("invalid bridge address")?;
    let bridge_change_address = BitcoinAddress::parse(&args.bridge_change_address, network)
        .context("invalid bridge change address")?;

    let stores = match args.db {
        DbBackend::Sqlite => {
            let sqlite = Arc::new(db::open_sqlite(&args.datadir).await?);
            Stores {
                vault: sqlite.clone(),
                state: sqlite.clone(),
                tracker: sqlite.clone(),
                actions: sqlite,
            }
        }
        DbBackend::Memory => {
            warn!("running against the in-memory store, state is lost on restart");
            Stores {
                vault: Arc::new(MemoryVault::default()),
                state: Arc::new(MemoryState::default()),
                tracker: Arc::new(MemoryTracker::default()),
                actions: Arc::new(MemoryActions::default()),
            }
        }
    };

    // clients for both sides
    let btc_client = Arc::new(
        BitcoinClient::new(args.btc_url.clone(), args.btc_user.clone(), args.btc_pass.clone())
            .context("could not create bitcoin client")?,
    );
    let chain_client = Arc::new(
        RpcChainClient::connect(&args.chain_url)
            .await
            .context("could not connect to the destination-chain adapter")?,
    );

    // threshold signer for mint/prepare witnesses
    let threshold_signer: Arc<dyn ThresholdSigner> = match &args.signer_url {
        Some(url) => Arc::new(
            RemoteSigner::connect(url)
                .await
                .context("could not connect to the signing service")?,
        ),
        None => {
            warn!("no signer url given, using a throwaway in-process key");
            Arc::new(LocalSigner::random())
        }
    };

    // signer for the BTC payout inputs
    let btc_signer = match (&args.btc_signing_key, &args.bridge_pubkey) {
        (Some(secret_hex), _) => {
            let secret = hex::decode(secret_hex).context("invalid btc signing key hex")?;
            let keypair = Keypair::from_secret_key(
                SECP256K1,
                &SecretKey::from_slice(&secret).context("invalid btc signing key")?,
            );
            BridgeSigner::SingleKey(KeySigner::new(keypair))
        }
        (None, Some(pubkey_hex)) => {
            let pubkey_bytes = hex::decode(pubkey_hex).context("invalid bridge pubkey hex")?;
            let x_only =
                XOnlyPublicKey::from_slice(&pubkey_bytes).context("invalid bridge pubkey")?;
            let public_key = PublicKey::from_x_only_public_key(x_only, secp256k1::Parity::Even);

            BridgeSigner::SchnorrRemote(RemoteSchnorrSigner::new(
                threshold_signer.clone(),
                public_key,
            ))
        }
        (None, None) => {
            bail!("either --btc-signing-key or --bridge-pubkey is required");
        }
    };

    // the state machine and its single writer
    let (state, applier) = StateHandle::new(stores.state.clone(), network, STATE_QUEUE_SIZE);

    // observer fanout: vault intake, mint intake, redeem completion
    let mut hub = ObserverHub::default();
    let vault_observer = VaultObserver::new(
        stores.vault.clone(),
        hub.subscribe_utxos(OBSERVER_QUEUE_SIZE),
    );
    let mint_observer = MintObserver::new(
        state.clone(),
        stores.actions.clone(),
        bridge_address.to_string(),
        hub.subscribe_deposits(OBSERVER_QUEUE_SIZE),
    );
    let redeem_observer = RedeemObserver::new(
        state.clone(),
        stores.actions.clone(),
        hub.subscribe_redeems(OBSERVER_QUEUE_SIZE),
    );
    let hub = Arc::new(hub);

    let monitor = BtcMonitor::new(
        btc_client.clone(),
        BtcMonitorConfig {
            start_height: args.btc_start_height,
            ..Default::default()
        },
        &bridge_address,
        &bridge_change_address,
        state.clone(),
        hub,
    );

    let synchronizer = ChainSynchronizer::new(
        chain_client.clone(),
        ChainSynchronizerConfig {
            poll_interval: FREQUENCY_TO_CHECK_FINALIZED_BLOCK,
            start_height: args.chain_start_height,
            confirmation_window: DEST_CONFIRMATION_WINDOW,
        },
        state.clone(),
    );

    let chain_manager = Arc::new(ChainTxManager::new(
        chain_client,
        state.clone(),
        stores.vault.clone(),
        stores.tracker,
        threshold_signer,
        ChainTxManagerConfig::default(),
    ));

    let btc_manager = BtcTxManager::new(
        btc_client,
        state,
        stores.vault,
        stores.actions,
        Arc::new(btc_signer),
        bridge_change_address,
        network,
        BtcTxManagerConfig::default(),
    );

    info!(
        event = "bridge node wired",
        %bridge_address,
        %network,
        db = %args.db,
    );

    // spawn every loop under one cancellable root
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    tasks.spawn(applier.run(cancel.clone()));
    tasks.spawn(vault_observer.run(cancel.clone()));
    tasks.spawn(mint_observer.run(cancel.clone()));
    tasks.spawn(redeem_observer.run(cancel.clone()));
    tasks.spawn(monitor.run(cancel.clone()));
    tasks.spawn(synchronizer.run(cancel.clone()));
    tasks.spawn(chain_manager.start(cancel.clone()));
    tasks.spawn(btc_manager.run(cancel.clone()));

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!(event = "shutdown requested");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }

    tasks.join_all().await;

    info!(event = "bridge node stopped");

    Ok(())
}
