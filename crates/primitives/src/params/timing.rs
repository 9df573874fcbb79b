use std::time::Duration;

/// Depth at which a BTC block is treated as final.
pub const CONSIDER_FINALIZED: u64 = 6;

/// How often the BTC monitor looks for newly finalized blocks.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(3);

/// How often the BTC tx manager polls for prepared redeems.
pub const QUERY_DB_INTERVAL: Duration = Duration::from_secs(3);

/// Default cadence of the destination-chain synchronizer.
pub const FREQUENCY_TO_CHECK_FINALIZED_BLOCK: Duration = Duration::from_secs(5);

/// Default cadence of the mint loop.
pub const FREQUENCY_TO_MINT: Duration = Duration::from_secs(5);

/// Default cadence of the prepare-redeem loop.
pub const FREQUENCY_TO_PREPARE_REDEEM: Duration = Duration::from_secs(5);

/// Default cadence of the pending-tx monitor loop.
pub const FREQUENCY_TO_MONITOR_PENDING_TXS: Duration = Duration::from_secs(10);

/// How long a manager waits for the threshold signer before giving up on the
/// current attempt.
pub const TIMEOUT_ON_WAITING_FOR_SIGNATURE: Duration = Duration::from_secs(30);

/// How long the prepare loop waits for a vault reservation.
pub const TIMEOUT_ON_WAITING_FOR_OUTPOINTS: Duration = Duration::from_secs(10);

/// Destination-chain blocks after which a pending tx is re-issued.
pub const TIMEOUT_ON_MONITORING_PENDING_TXS: u64 = 20;

/// How far the synchronizer rewinds when a reported block reorgs away.
pub const DEST_CONFIRMATION_WINDOW: u64 = 12;

/// How long a vault reservation survives without the prepare completing.
pub const RESERVATION_TTL: Duration = Duration::from_secs(300);
