//! Transactional block processing.
//!
//! `process_block` hands the caller a [`BlockTxn`] for exactly-once,
//! all-or-nothing application of one block: the closure's mutations, the
//! block's `block_index` row, and the serialized undo log commit together or
//! not at all. `revert_block` is the mirror image, replaying the stored undo
//! log in reverse after the caller's deindex closure has run.

use std::future::Future;

use sqlx::Row;
use tracing::{debug, warn};

use blockvine_core::error::IndexerError;
use blockvine_core::types::BlockHeader;

use crate::store::SqliteStore;
use crate::txn::{replay_undo_log, BlockTxn};
use crate::undo::UndoOperation;

/// Applies and reverts blocks as atomic storage transactions.
#[derive(Clone)]
pub struct BlockProcessor {
    store: SqliteStore,
}

impl BlockProcessor {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Process `header` exactly once.
    ///
    /// The closure receives the open [`BlockTxn`] and must hand it back;
    /// dropping it on the error path rolls the whole transaction back,
    /// leaving no trace of the block. Fails with
    /// [`IndexerError::DuplicateBlock`] if a `block_index` row for this
    /// block number already exists.
    pub async fn process_block<F, Fut>(
        &self,
        header: &BlockHeader,
        work: F,
    ) -> Result<(), IndexerError>
    where
        F: FnOnce(BlockTxn) -> Fut,
        Fut: Future<Output = Result<BlockTxn, IndexerError>>,
    {
        let txn = self
            .store
            .pool()
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        let mut block_txn = BlockTxn::new(txn);

        // Duplicate check inside the transaction, so concurrent attempts at
        // the same block cannot both pass.
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT block_number FROM block_index WHERE block_number = ?")
                .bind(header.number as i64)
                .fetch_optional(&mut **block_txn.raw())
                .await
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
        if exists.is_some() {
            return Err(IndexerError::DuplicateBlock {
                block_number: header.number,
            });
        }

        let block_txn = work(block_txn).await?;

        let (mut txn, undo_log) = block_txn.into_parts();
        let undo_json =
            serde_json::to_string(&undo_log).map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO block_index (block_number, block_hash, undo_log, processed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(header.number as i64)
        .bind(&header.hash)
        .bind(&undo_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *txn)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(
            block = header.number,
            undo_entries = undo_log.len(),
            "block processed"
        );
        Ok(())
    }

    /// Revert a previously processed block.
    ///
    /// A block with no `block_index` row is a no-op: `work` does not run and
    /// no error is raised. Otherwise `work` runs first (deindex emissions),
    /// then the stored undo log is replayed in reverse mutation order, and
    /// finally the block's row is deleted. All of it commits atomically.
    pub async fn revert_block<F, Fut>(
        &self,
        block_number: u64,
        work: F,
    ) -> Result<(), IndexerError>
    where
        F: FnOnce(BlockTxn) -> Fut,
        Fut: Future<Output = Result<BlockTxn, IndexerError>>,
    {
        let txn = self
            .store
            .pool()
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        let mut block_txn = BlockTxn::new(txn);

        // Record read inside the transaction, so a racing revert of the same
        // block cannot replay an undo log that another revert already
        // consumed.
        let row = sqlx::query("SELECT undo_log FROM block_index WHERE block_number = ?")
            .bind(block_number as i64)
            .fetch_optional(&mut **block_txn.raw())
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        let undo_log: Vec<UndoOperation> = match row {
            Some(r) => {
                let undo_json: String = r.get("undo_log");
                serde_json::from_str(&undo_json)
                    .map_err(|e| IndexerError::Storage(e.to_string()))?
            }
            None => {
                warn!(block = block_number, "revert of unprocessed block ignored");
                return Ok(());
            }
        };

        let block_txn = work(block_txn).await?;

        // Deindex mutations need no undo log; the block's record is gone
        // after this commit.
        let (mut txn, _) = block_txn.into_parts();
        replay_undo_log(&mut txn, &undo_log).await?;

        sqlx::query("DELETE FROM block_index WHERE block_number = ?")
            .bind(block_number as i64)
            .execute(&mut *txn)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(
            block = block_number,
            undo_entries = undo_log.len(),
            "block reverted"
        );
        Ok(())
    }
}
