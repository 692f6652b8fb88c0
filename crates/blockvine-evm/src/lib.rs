//! blockvine-evm — the EVM-facing half of the indexer.
//!
//! # Architecture
//!
//! ```text
//! BlockMonitor::run()
//!     ├── EthRpcClient        (batched headers, filtered eth_getLogs)
//!     ├── fetch_block_events  (hash-chain validation, log attribution)
//!     └── BlockIngest
//!             ├── LogDecoder       (raw log → typed event)
//!             ├── EventDispatcher  (blockvine-core)
//!             └── BlockProcessor   (blockvine-storage)
//! ```

pub mod client;
pub mod decoder;
pub mod ingest;
pub mod monitor;

pub use client::{EthRpcClient, HttpRpcClient, LogQuery};
pub use decoder::LogDecoder;
pub use ingest::BlockIngest;
pub use monitor::{BlockMonitor, BlockProcessingDetails};
