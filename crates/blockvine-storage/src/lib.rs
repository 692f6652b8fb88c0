//! blockvine-storage — SQLite persistence with undo-logged block transactions.
//!
//! The write path is [`BlockProcessor`]: each block is applied inside one
//! SQLite transaction through a [`BlockTxn`], which records the inverse of
//! every entity mutation. Reverting a block replays that undo log in reverse,
//! restoring storage to the exact pre-block state.

pub mod processor;
pub mod store;
pub mod txn;
pub mod undo;

pub use processor::BlockProcessor;
pub use store::{BlockIndexRecord, SqliteStore, LATEST_BLOCK, LATEST_INDEXED_BLOCK};
pub use txn::BlockTxn;
pub use undo::UndoOperation;
