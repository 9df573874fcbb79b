//! Parses command-line arguments for the bridge node.
use std::{fmt::Display, path::PathBuf, str::FromStr};

use clap::{crate_version, Parser, ValueEnum};

#[derive(Debug, Parser)]
#[clap(
    name = "wbtc-bridge",
    about = "The bridge node locking BTC against a wrapped token",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        help = "Path to the directory where to store the database",
        default_value = "."
    )]
    pub datadir: PathBuf,

    #[clap(
        long,
        value_enum,
        help = "Database backend to run against",
        default_value_t = DbBackend::Sqlite
    )]
    pub db: DbBackend,

    #[clap(long, help = "URL for the Bitcoin Core RPC")]
    pub btc_url: String,

    #[clap(long, help = "Username for the Bitcoin Core RPC", env = "BRIDGE_BTC_USER")]
    pub btc_user: String,

    #[clap(long, help = "Password for the Bitcoin Core RPC", env = "BRIDGE_BTC_PASS")]
    pub btc_pass: String,

    #[clap(
        long,
        help = "Bitcoin network the bridge operates on (bitcoin, testnet, signet, regtest)"
    )]
    pub btc_network: bitcoin::Network,

    #[clap(long, help = "Websocket URL of the destination-chain adapter")]
    pub chain_url: String,

    #[clap(
        long,
        help = "Websocket URL of the threshold signing service; a throwaway in-process key is used when omitted"
    )]
    pub signer_url: Option<String>,

    #[clap(
        long,
        help = "Hex-encoded secret key for signing BTC payouts locally",
        env = "BRIDGE_BTC_SIGNING_KEY"
    )]
    pub btc_signing_key: Option<String>,

    #[clap(
        long,
        help = "Hex-encoded x-only public key the threshold service signs BTC inputs for"
    )]
    pub bridge_pubkey: Option<String>,

    #[clap(long, help = "Bridge deposit address on the BTC side")]
    pub bridge_address: String,

    #[clap(long, help = "Bridge change address on the BTC side")]
    pub bridge_change_address: String,

    #[clap(
        long,
        help = "BTC height to start scanning from when no cursor is stored",
        default_value_t = 0
    )]
    pub btc_start_height: u64,

    #[clap(
        long,
        help = "Destination-chain height to start syncing from when no cursor is stored",
        default_value_t = 0
    )]
    pub chain_start_height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DbBackend {
    /// Persist everything in a sqlite database under the data directory.
    Sqlite,

    /// Keep everything in memory. Dev only: state is lost on restart.
    Memory,
}

impl Display for DbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbBackend::Sqlite => write!(f, "sqlite"),
            DbBackend::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for DbBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            _ => Err("Invalid db backend".to_string()),
        }
    }
}
