//! blockvine-core — foundation for the reorg-safe contract event indexer.
//!
//! # Architecture
//!
//! ```text
//! BlockMonitor (blockvine-evm)
//!     ├── TopicRegistry    (ABI → topic filters, wildcard precedence)
//!     ├── LogDecoder       (raw logs → typed events)
//!     ├── EventDispatcher  (pattern-matched subscriber hooks)
//!     └── BlockProcessor   (blockvine-storage: undo-logged transactions)
//! ```
//!
//! This crate holds the pieces shared by the EVM and storage layers: the core
//! types, configuration, the topic registry, pattern matching, the subscriber
//! seam, and the sync-status state machine.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod pattern;
pub mod range;
pub mod registry;
pub mod status;
pub mod types;

pub use config::{
    ContractConfig, IndexerConfig, MonitorConfig, NetworkConfig, MAX_BLOCK_NUMBER,
    WILDCARD_ADDRESS,
};
pub use dispatch::{
    BlockSubscriber, EntityTxn, EventDispatcher, EventSubscriber, IndexingContext, Subscriptions,
};
pub use error::IndexerError;
pub use pattern::matches_event_pattern;
pub use range::{next_block_range, BlockRange};
pub use registry::{BlockSpan, TopicEntry, TopicFilter, TopicRegistry};
pub use status::{StatusCell, SyncStatus};
pub use types::{BlockEvent, BlockHeader, LogEvent, RawLog};
