//! SQLite store for entities, per-block undo logs, and sync pointers.
//!
//! Uses `sqlx` with WAL mode. Three tables:
//!
//! - `entities`     — subscriber-owned rows, keyed `(collection, id)`
//! - `block_index`  — one row per processed block, carrying its undo log
//! - `pointers`     — sync progress markers (JSON block headers)
//!
//! Pointer writes happen outside block transactions: a pointer is a progress
//! hint, never part of a block's atomic unit of work.

use sqlx::{Row, SqlitePool};
use tracing::debug;

use blockvine_core::error::IndexerError;
use blockvine_core::types::BlockHeader;

use crate::undo::UndoOperation;

/// Pointer key for the latest chain head the monitor has observed.
pub const LATEST_BLOCK: &str = "latest_block";

/// Pointer key for the most recently indexed block.
pub const LATEST_INDEXED_BLOCK: &str = "latest_indexed_block";

/// One row of the `block_index` table.
#[derive(Debug, Clone)]
pub struct BlockIndexRecord {
    pub block_number: u64,
    pub block_hash: String,
    pub undo_log: Vec<UndoOperation>,
    pub processed_at: i64,
}

/// SQLite-backed store shared by the block processor and the sync loop.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./index.db"`) or a full
    /// SQLite URL (`"sqlite:./index.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                collection TEXT    NOT NULL,
                id         INTEGER NOT NULL,
                data       TEXT    NOT NULL,
                PRIMARY KEY (collection, id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block_index (
                block_number INTEGER PRIMARY KEY,
                block_hash   TEXT    NOT NULL,
                undo_log     TEXT    NOT NULL,
                processed_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pointers (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }

    // ─── Block index ─────────────────────────────────────────────────────────

    /// Look up the processing record of a block, if it was processed.
    pub async fn block_record(
        &self,
        block_number: u64,
    ) -> Result<Option<BlockIndexRecord>, IndexerError> {
        let row = sqlx::query(
            "SELECT block_number, block_hash, undo_log, processed_at
             FROM block_index WHERE block_number = ?",
        )
        .bind(block_number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| {
            let undo_json: String = r.get("undo_log");
            let undo_log: Vec<UndoOperation> = serde_json::from_str(&undo_json)
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
            Ok(BlockIndexRecord {
                block_number: r.get::<i64, _>("block_number") as u64,
                block_hash: r.get("block_hash"),
                undo_log,
                processed_at: r.get("processed_at"),
            })
        })
        .transpose()
    }

    /// Highest processed block number, if any block was processed.
    pub async fn highest_processed_block(&self) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query("SELECT MAX(block_number) as max_block FROM block_index")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let max: Option<i64> = row.get("max_block");
        Ok(max.map(|n| n as u64))
    }

    // ─── Entities (read-side, outside block transactions) ───────────────────

    /// Fetch an entity outside any block transaction.
    pub async fn get_entity(
        &self,
        collection: &str,
        id: i64,
    ) -> Result<Option<serde_json::Value>, IndexerError> {
        let row = sqlx::query("SELECT data FROM entities WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| {
            let data: String = r.get("data");
            serde_json::from_str(&data).map_err(|e| IndexerError::Storage(e.to_string()))
        })
        .transpose()
    }

    /// Number of entities in a collection.
    pub async fn entity_count(&self, collection: &str) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM entities WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    // ─── Pointers ────────────────────────────────────────────────────────────

    /// Upsert a block-header pointer.
    pub async fn set_pointer(&self, key: &str, header: &BlockHeader) -> Result<(), IndexerError> {
        let value =
            serde_json::to_string(header).map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query("INSERT OR REPLACE INTO pointers (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(&value)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(key, block = header.number, "pointer updated");
        Ok(())
    }

    /// Read a block-header pointer.
    pub async fn get_pointer(&self, key: &str) -> Result<Option<BlockHeader>, IndexerError> {
        let row = sqlx::query("SELECT value FROM pointers WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| {
            let value: String = r.get("value");
            serde_json::from_str(&value).map_err(|e| IndexerError::Storage(e.to_string()))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            hash: format!("0x{number:064x}"),
            parent_hash: format!("0x{:064x}", number.wrapping_sub(1)),
            number,
            timestamp: 1_700_000_000 + number as i64 * 12,
        }
    }

    #[tokio::test]
    async fn pointer_roundtrip_and_upsert() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get_pointer(LATEST_BLOCK).await.unwrap().is_none());

        store.set_pointer(LATEST_BLOCK, &header(100)).await.unwrap();
        store.set_pointer(LATEST_BLOCK, &header(101)).await.unwrap();

        let loaded = store.get_pointer(LATEST_BLOCK).await.unwrap().unwrap();
        assert_eq!(loaded.number, 101);
        assert_eq!(loaded, header(101));
    }

    #[tokio::test]
    async fn pointers_are_independent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set_pointer(LATEST_BLOCK, &header(200)).await.unwrap();
        store
            .set_pointer(LATEST_INDEXED_BLOCK, &header(150))
            .await
            .unwrap();

        assert_eq!(
            store.get_pointer(LATEST_BLOCK).await.unwrap().unwrap().number,
            200
        );
        assert_eq!(
            store
                .get_pointer(LATEST_INDEXED_BLOCK)
                .await
                .unwrap()
                .unwrap()
                .number,
            150
        );
    }

    #[tokio::test]
    async fn block_record_missing_returns_none() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.block_record(42).await.unwrap().is_none());
        assert!(store.highest_processed_block().await.unwrap().is_none());
    }
}
