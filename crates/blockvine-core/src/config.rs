//! Indexer configuration: network endpoint plus per-contract registrations.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Sentinel address meaning "any contract address".
pub const WILDCARD_ADDRESS: &str = "*";

/// "Infinity" end block for open-ended contract registrations.
pub const MAX_BLOCK_NUMBER: u64 = u64::MAX;

/// Network connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
}

/// One contract registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Contract ABI as standard JSON (the `abi` array of a build artifact).
    pub abi: serde_json::Value,
    /// Contract address; `None` registers the events under the wildcard
    /// address and matches any emitter.
    #[serde(default)]
    pub address: Option<String>,
    /// First block this contract is active at (default 0).
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Last block this contract is active at (default unbounded).
    #[serde(default)]
    pub end_block: Option<u64>,
    /// Event names from the ABI to skip entirely.
    #[serde(default)]
    pub exclude_events: Vec<String>,
}

/// Top-level indexer configuration.
///
/// Contract order is preserved: it determines address-list order in computed
/// log filters and reverse-lookup priority for contract names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub contracts: IndexMap<String, ContractConfig>,
}

/// Tuning knobs for the sync loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause between loop iterations.
    pub sleep_interval: Duration,
    /// Maximum blocks per header/log fetch sub-range.
    pub max_blocks_per_query: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sleep_interval: Duration::from_secs(5),
            max_blocks_per_query: 100,
        }
    }
}
