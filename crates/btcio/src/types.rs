use serde::{Deserialize, Serialize};

/// Subset of the `getblockchaininfo` response the bridge cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetBlockchainInfo {
    /// Current network name (main, test, testnet4, signet, regtest).
    pub chain: String,

    /// The height of the most-work fully-validated chain.
    pub blocks: u64,

    /// The hash of the currently best block.
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: String,
}
