//! Sync-status state machine shared between the monitor loop and the
//! administrative control surface.
//!
//! The loop re-reads the status at defined checkpoints (top of loop, between
//! sub-ranges), so a stop request is honored within one sub-range's latency.
//! There is no preemptive cancellation; undo-log correctness depends on
//! block-sized atomic units of work.

use std::fmt;
use std::sync::Mutex;

use crate::error::IndexerError;

/// Lifecycle state of the block monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Constructed but the sync loop has not been entered yet.
    AwaitingInitialization,
    /// Synchronously fetching and applying the configured start block.
    FetchingStartBlock,
    /// Following the chain head.
    Running,
    /// Stop requested; the loop flips to `Stopped` at its next iteration.
    Stopping,
    /// Idle; the loop still ticks but does no work.
    Stopped,
    /// Process shutdown; the loop exits permanently.
    Terminated,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingInitialization => write!(f, "awaiting-initialization"),
            Self::FetchingStartBlock => write!(f, "fetching-start-block"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Shared, mutex-guarded status cell.
///
/// Transitions are compare-and-set: the control surface can only move the
/// machine along the documented edges, and a violated precondition surfaces
/// as an `InvalidState` error rather than crashing the loop.
#[derive(Debug)]
pub struct StatusCell {
    inner: Mutex<SyncStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SyncStatus::AwaitingInitialization),
        }
    }

    /// Current status.
    pub fn get(&self) -> SyncStatus {
        *self.inner.lock().unwrap()
    }

    /// Unconditionally set the status. Reserved for the loop itself and for
    /// process shutdown (`Terminated`).
    pub fn set(&self, status: SyncStatus) {
        *self.inner.lock().unwrap() = status;
    }

    /// Move from `from` to `to`, failing if the current status differs.
    pub fn transition(&self, from: SyncStatus, to: SyncStatus) -> Result<(), IndexerError> {
        let mut cur = self.inner.lock().unwrap();
        if *cur != from {
            return Err(IndexerError::InvalidState {
                reason: format!("expected {from}, but status is {cur}"),
            });
        }
        *cur = to;
        Ok(())
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
