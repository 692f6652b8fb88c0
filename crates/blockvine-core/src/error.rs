//! Error types for the indexing pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Block {block_number} has already been processed")]
    DuplicateBlock { block_number: u64 },

    #[error("Broken header chain at block {number}: expected parent {expected}, got {actual}")]
    BrokenChain {
        number: u64,
        expected: String,
        actual: String,
    },

    #[error("No fetched header matches log block hash {block_hash}")]
    UnknownBlockHash { block_hash: String },

    #[error("Invalid monitor state: {reason}")]
    InvalidState { reason: String },

    #[error("Subscriber error: {0}")]
    Subscriber(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error signals a stale or reorged header set
    /// (the fetch pass should be abandoned and retried next tick).
    pub fn is_chain_continuity(&self) -> bool {
        matches!(
            self,
            Self::BrokenChain { .. } | Self::UnknownBlockHash { .. }
        )
    }
}
