//! The per-block entity transaction.
//!
//! `BlockTxn` wraps one SQLite transaction and records the inverse of every
//! mutation. The block processor serializes the accumulated undo log into the
//! block's `block_index` row before committing, so a crash either leaves the
//! block fully applied (with its undo log) or not applied at all.

use async_trait::async_trait;
use sqlx::{Row, Sqlite, Transaction};

use blockvine_core::dispatch::EntityTxn;
use blockvine_core::error::IndexerError;

use crate::undo::UndoOperation;

/// An open block transaction: entity mutations plus their undo log.
pub struct BlockTxn {
    txn: Transaction<'static, Sqlite>,
    undo: Vec<UndoOperation>,
}

impl BlockTxn {
    pub(crate) fn new(txn: Transaction<'static, Sqlite>) -> Self {
        Self {
            txn,
            undo: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (Transaction<'static, Sqlite>, Vec<UndoOperation>) {
        (self.txn, self.undo)
    }

    pub(crate) fn raw(&mut self) -> &mut Transaction<'static, Sqlite> {
        &mut self.txn
    }

    /// Number of undo entries recorded so far.
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    async fn fetch(
        &mut self,
        collection: &str,
        id: i64,
    ) -> Result<Option<serde_json::Value>, IndexerError> {
        let row = sqlx::query("SELECT data FROM entities WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *self.txn)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| {
            let data: String = r.get("data");
            serde_json::from_str(&data).map_err(|e| IndexerError::Storage(e.to_string()))
        })
        .transpose()
    }

    /// Next free id within `collection`, computed inside the transaction so
    /// ids are dense and deterministic under single-writer processing.
    async fn next_id(&mut self, collection: &str) -> Result<i64, IndexerError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(id), 0) + 1 as next_id FROM entities WHERE collection = ?",
        )
        .bind(collection)
        .fetch_one(&mut *self.txn)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.get("next_id"))
    }

    async fn write(
        &mut self,
        collection: &str,
        id: i64,
        data: &serde_json::Value,
    ) -> Result<(), IndexerError> {
        let payload =
            serde_json::to_string(data).map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query("UPDATE entities SET data = ? WHERE collection = ? AND id = ?")
            .bind(&payload)
            .bind(collection)
            .bind(id)
            .execute(&mut *self.txn)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Shallow merge of `patch` over `original`; a non-object patch replaces
/// the payload wholesale.
fn merge_patch(original: &serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (original, patch) {
        (serde_json::Value::Object(original), serde_json::Value::Object(patch)) => {
            let mut merged = original.clone();
            for (key, value) in patch {
                merged.insert(key, value);
            }
            serde_json::Value::Object(merged)
        }
        (_, patch) => patch,
    }
}

#[async_trait]
impl EntityTxn for BlockTxn {
    async fn insert(
        &mut self,
        collection: &str,
        data: serde_json::Value,
    ) -> Result<i64, IndexerError> {
        let id = self.next_id(collection).await?;
        let payload =
            serde_json::to_string(&data).map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query("INSERT INTO entities (collection, id, data) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(id)
            .bind(&payload)
            .execute(&mut *self.txn)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        self.undo.push(UndoOperation::Delete {
            collection: collection.to_string(),
            id,
        });
        Ok(id)
    }

    async fn update(
        &mut self,
        collection: &str,
        id: i64,
        patch: serde_json::Value,
    ) -> Result<(), IndexerError> {
        let original = self.fetch(collection, id).await?.ok_or_else(|| {
            IndexerError::Storage(format!("entity {collection}/{id} not found for update"))
        })?;

        let merged = merge_patch(&original, patch);
        self.write(collection, id, &merged).await?;

        self.undo.push(UndoOperation::Update {
            collection: collection.to_string(),
            id,
            data: original,
        });
        Ok(())
    }

    async fn delete(&mut self, collection: &str, id: i64) -> Result<(), IndexerError> {
        let original = self.fetch(collection, id).await?.ok_or_else(|| {
            IndexerError::Storage(format!("entity {collection}/{id} not found for delete"))
        })?;

        sqlx::query("DELETE FROM entities WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut *self.txn)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        self.undo.push(UndoOperation::Insert {
            collection: collection.to_string(),
            id,
            data: original,
        });
        Ok(())
    }

    async fn get(
        &mut self,
        collection: &str,
        id: i64,
    ) -> Result<Option<serde_json::Value>, IndexerError> {
        self.fetch(collection, id).await
    }
}

/// Replay a block's undo log in strict reverse mutation order, executing
/// each entry as named. Runs inside the revert transaction and records
/// nothing.
pub(crate) async fn replay_undo_log(
    txn: &mut Transaction<'static, Sqlite>,
    undo_log: &[UndoOperation],
) -> Result<(), IndexerError> {
    for op in undo_log.iter().rev() {
        match op {
            UndoOperation::Insert {
                collection,
                id,
                data,
            } => {
                let payload = serde_json::to_string(data)
                    .map_err(|e| IndexerError::Storage(e.to_string()))?;
                sqlx::query("INSERT INTO entities (collection, id, data) VALUES (?, ?, ?)")
                    .bind(collection)
                    .bind(id)
                    .bind(&payload)
                    .execute(&mut **txn)
                    .await
                    .map_err(|e| IndexerError::Storage(e.to_string()))?;
            }
            UndoOperation::Update {
                collection,
                id,
                data,
            } => {
                let payload = serde_json::to_string(data)
                    .map_err(|e| IndexerError::Storage(e.to_string()))?;
                sqlx::query("UPDATE entities SET data = ? WHERE collection = ? AND id = ?")
                    .bind(&payload)
                    .bind(collection)
                    .bind(id)
                    .execute(&mut **txn)
                    .await
                    .map_err(|e| IndexerError::Storage(e.to_string()))?;
            }
            UndoOperation::Delete { collection, id } => {
                sqlx::query("DELETE FROM entities WHERE collection = ? AND id = ?")
                    .bind(collection)
                    .bind(id)
                    .execute(&mut **txn)
                    .await
                    .map_err(|e| IndexerError::Storage(e.to_string()))?;
            }
        }
    }
    Ok(())
}
