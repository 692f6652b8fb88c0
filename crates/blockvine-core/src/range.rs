//! Block-range chunking for batched log queries.

use serde::{Deserialize, Serialize};

/// An inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks covered (both ends inclusive).
    pub fn len(&self) -> u64 {
        self.to.saturating_sub(self.from) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    /// Returns `true` if `[self.from, self.to]` overlaps `[start, end]`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        start <= self.to && end >= self.from
    }
}

/// Computes the range of blocks to request in the next log query.
///
/// `eth_getLogs` ranges are inclusive at both ends, so consecutive chunks
/// must be exclusive of one another to avoid fetching the same blocks' logs
/// twice.
pub fn next_block_range(from: u64, to: u64, max_range: u64) -> BlockRange {
    if to < from {
        return BlockRange::new(from, to);
    }
    let requested = to - from + 1;
    if requested > max_range {
        return BlockRange::new(from, from + max_range - 1);
    }
    BlockRange::new(from, to)
}
