use alloy_primitives::B256;
use async_trait::async_trait;

use crate::errors::DbResult;

/// Which manager operation a monitored tx carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Mint,
    PrepareRedeem,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mint => write!(f, "mint"),
            Self::PrepareRedeem => write!(f, "prepare_redeem"),
        }
    }
}

impl std::str::FromStr for TxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mint" => Ok(Self::Mint),
            "prepare_redeem" => Ok(Self::PrepareRedeem),
            other => Err(format!("unknown tx kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoredTxStatus {
    Pending,
    Success,
    Reverted,
    Timeout,
    Reorg,
    Malformed,
    Limbo,
}

impl std::fmt::Display for MonitoredTxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Reverted => "reverted",
            Self::Timeout => "timeout",
            Self::Reorg => "reorg",
            Self::Malformed => "malformed",
            Self::Limbo => "limbo",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MonitoredTxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "reverted" => Ok(Self::Reverted),
            "timeout" => Ok(Self::Timeout),
            "reorg" => Ok(Self::Reorg),
            "malformed" => Ok(Self::Malformed),
            "limbo" => Ok(Self::Limbo),
            other => Err(format!("unknown monitored tx status: {other}")),
        }
    }
}

/// A destination-chain transaction awaiting confirmation. The stored
/// signature allows a byte-identical reissue after a timeout or reorg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredTx {
    pub tx_hash: B256,

    /// Domain identifier: the mint's `btc_tx_id` bytes or the redeem's
    /// `request_tx_hash`.
    pub domain_id: B256,

    pub kind: TxKind,
    pub sent_after_block: u64,
    pub sent_after_hash: B256,
    pub signing_hash: B256,
    pub rx: B256,
    pub s: B256,
    pub mined_at_hash: Option<B256>,
    pub status: MonitoredTxStatus,
}

/// Monitored-tx rows are owned exclusively by the manager that submitted
/// them.
#[async_trait]
pub trait MonitoredTxDb {
    async fn insert_monitored_tx(&self, tx: &MonitoredTx) -> DbResult<()>;

    async fn pending_monitored_txs(&self) -> DbResult<Vec<MonitoredTx>>;

    async fn set_monitored_tx_status(
        &self,
        tx_hash: B256,
        status: MonitoredTxStatus,
        mined_at_hash: Option<B256>,
    ) -> DbResult<()>;

    /// The most recent monitored tx for a domain id, if any. Used to reissue
    /// with the stored signature instead of requesting a new one.
    async fn get_monitored_tx_for(&self, domain_id: B256, kind: TxKind)
        -> DbResult<Option<MonitoredTx>>;

    /// Replace a reissued tx: the old row keeps its terminal status, the new
    /// submission is tracked under its own hash.
    async fn record_reissue(&self, old_tx_hash: B256, new_tx: &MonitoredTx) -> DbResult<()>;
}
