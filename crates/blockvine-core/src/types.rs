//! Shared types for the indexing pipeline.

use serde::{Deserialize, Serialize};

// ─── BlockHeader ─────────────────────────────────────────────────────────────

/// A block header as fetched from the RPC layer — immutable once fetched.
/// Identity is `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
    /// Block number.
    pub number: u64,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

impl BlockHeader {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockHeader) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

// ─── RawLog ──────────────────────────────────────────────────────────────────

/// A raw EVM log, sourced verbatim from `eth_getLogs`. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Contract address that emitted the log.
    pub address: String,
    /// Ordered topic hashes; `topics[0]` is the event signature hash.
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed data (`0x…`).
    pub data: String,
    /// Hash of the containing block.
    pub block_hash: String,
    /// Number of the containing block.
    pub block_number: u64,
    /// Hash of the containing transaction.
    pub transaction_hash: String,
    /// Index of the transaction within the block.
    pub transaction_index: u32,
    /// Index of the log within the block.
    pub log_index: u32,
}

impl RawLog {
    /// The event signature hash (`topics[0]`), if present.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

// ─── BlockEvent ──────────────────────────────────────────────────────────────

/// A block header together with the relevant logs it contains, in on-chain
/// log-index order. Built by the monitor per fetch cycle and discarded after
/// processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEvent {
    pub header: BlockHeader,
    pub logs: Vec<RawLog>,
}

impl BlockEvent {
    /// A block event with no logs attached yet.
    pub fn bare(header: BlockHeader) -> Self {
        Self {
            header,
            logs: Vec::new(),
        }
    }
}

// ─── LogEvent ────────────────────────────────────────────────────────────────

/// A decoded contract event, ready for dispatch to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// The raw log this event was decoded from.
    pub log: RawLog,
    /// Timestamp of the containing block.
    pub block_timestamp: i64,
    /// Event name from the matching ABI fragment (e.g. `"Transfer"`).
    pub name: String,
    /// Decoded parameters, keyed by parameter name.
    pub fields: serde_json::Value,
}
