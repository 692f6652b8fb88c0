//! The block monitor: the top-level sync loop.
//!
//! One logical loop per process. Each tick while `Running` syncs to the
//! chain head in capped sub-ranges; any error aborts the pass, is logged,
//! and the next tick retries. Administrative calls (`stop`, `start`,
//! `set_start_block`) only move the shared status cell, which the loop
//! re-reads at the top of each tick and between sub-ranges.

use std::sync::Arc;

use tracing::{error, info};

use blockvine_core::config::MonitorConfig;
use blockvine_core::error::IndexerError;
use blockvine_core::range::{next_block_range, BlockRange};
use blockvine_core::registry::TopicRegistry;
use blockvine_core::status::{StatusCell, SyncStatus};
use blockvine_core::types::{BlockEvent, BlockHeader};
use blockvine_storage::{SqliteStore, LATEST_BLOCK, LATEST_INDEXED_BLOCK};

use crate::client::{EthRpcClient, LogQuery};
use crate::ingest::BlockIngest;

/// Snapshot of sync progress.
#[derive(Debug, Clone)]
pub struct BlockProcessingDetails {
    /// Chain head height minus latest indexed height; `-1` when nothing has
    /// ever been indexed.
    pub blocks_elapsed: i64,
    pub latest_indexed_block: Option<BlockHeader>,
    pub latest_chain_head: BlockHeader,
}

pub struct BlockMonitor {
    client: Arc<dyn EthRpcClient>,
    registry: Arc<TopicRegistry>,
    ingest: BlockIngest,
    store: SqliteStore,
    status: Arc<StatusCell>,
    config: MonitorConfig,
}

impl BlockMonitor {
    pub fn new(
        client: Arc<dyn EthRpcClient>,
        registry: Arc<TopicRegistry>,
        ingest: BlockIngest,
        store: SqliteStore,
        config: MonitorConfig,
    ) -> Self {
        Self {
            client,
            registry,
            ingest,
            store,
            status: Arc::new(StatusCell::new()),
            config,
        }
    }

    // ─── Control surface ─────────────────────────────────────────────────────

    pub fn status(&self) -> SyncStatus {
        self.status.get()
    }

    /// Request a stop. The loop flips to `Stopped` at its next tick.
    pub fn stop(&self) -> Result<(), IndexerError> {
        self.status
            .transition(SyncStatus::Running, SyncStatus::Stopping)
    }

    /// Resume after a stop.
    pub fn start(&self) -> Result<(), IndexerError> {
        self.status
            .transition(SyncStatus::Stopped, SyncStatus::Running)
    }

    /// Terminate the loop permanently. Valid from any state.
    pub fn shutdown(&self) {
        self.status.set(SyncStatus::Terminated);
    }

    /// Synchronously fetch and apply exactly block `number`.
    ///
    /// Only valid while `Running` and before any block has ever been
    /// indexed; this is the ledger bootstrap.
    pub async fn set_start_block(&self, number: u64) -> Result<(), IndexerError> {
        if self.store.get_pointer(LATEST_INDEXED_BLOCK).await?.is_some() {
            return Err(IndexerError::InvalidState {
                reason: "cannot set start block: blocks have already been indexed".into(),
            });
        }

        self.status
            .transition(SyncStatus::Running, SyncStatus::FetchingStartBlock)?;
        let result = self.sync_range(BlockRange::new(number, number)).await;
        self.status.set(SyncStatus::Running);
        result
    }

    /// Sync progress relative to the chain head. Also persists the freshest
    /// head pointer, so a later pass failure still leaves it observable.
    pub async fn block_processing_details(
        &self,
    ) -> Result<BlockProcessingDetails, IndexerError> {
        let latest_chain_head = self.client.latest_header().await?;
        self.store.set_pointer(LATEST_BLOCK, &latest_chain_head).await?;

        let latest_indexed_block = self.store.get_pointer(LATEST_INDEXED_BLOCK).await?;
        let blocks_elapsed = match &latest_indexed_block {
            Some(indexed) => latest_chain_head.number as i64 - indexed.number as i64,
            None => -1,
        };

        Ok(BlockProcessingDetails {
            blocks_elapsed,
            latest_indexed_block,
            latest_chain_head,
        })
    }

    // ─── Sync loop ───────────────────────────────────────────────────────────

    /// Enter the sync loop. Fails if called more than once; returns only
    /// after `shutdown()`.
    pub async fn run(&self) -> Result<(), IndexerError> {
        self.status
            .transition(SyncStatus::AwaitingInitialization, SyncStatus::Running)
            .map_err(|_| IndexerError::InvalidState {
                reason: "monitor already started".into(),
            })?;
        info!("block monitor started");

        loop {
            match self.status.get() {
                SyncStatus::Terminated => break,
                SyncStatus::Stopping => {
                    self.status.set(SyncStatus::Stopped);
                    info!("block monitor stopped");
                }
                SyncStatus::Running => {
                    // The loop itself never dies on a failed pass.
                    if let Err(e) = self.sync_to_latest_block().await {
                        error!(error = %e, "sync pass failed");
                    }
                }
                _ => {}
            }
            tokio::time::sleep(self.config.sleep_interval).await;
        }

        info!("block monitor terminated");
        Ok(())
    }

    /// One full catch-up pass toward the chain head.
    pub async fn sync_to_latest_block(&self) -> Result<(), IndexerError> {
        let details = self.block_processing_details().await?;

        let latest_indexed = match details.latest_indexed_block {
            Some(header) => header,
            None => {
                // Bootstrap: index exactly one start block.
                let start = self
                    .registry
                    .start_block()
                    .unwrap_or(details.latest_chain_head.number);
                info!(start, "no blocks indexed yet, applying start block");
                return self.set_start_block(start).await;
            }
        };

        if details.blocks_elapsed <= 0 {
            return Ok(());
        }

        let mut from = latest_indexed.number + 1;
        let to = details.latest_chain_head.number;
        while from <= to {
            // A concurrent stop() is honored between sub-ranges.
            if self.status.get() != SyncStatus::Running {
                break;
            }
            let range = next_block_range(from, to, self.config.max_blocks_per_query);
            self.sync_range(range).await?;
            from = range.to + 1;
        }
        Ok(())
    }

    async fn sync_range(&self, range: BlockRange) -> Result<(), IndexerError> {
        let blocks = self.fetch_block_events(range).await?;
        self.ingest.index_blocks(&blocks).await
    }

    /// Fetch headers and relevant logs for `range`, validating that the
    /// headers form an unbroken hash chain and that every log belongs to a
    /// fetched header. Either violation means the fetched view is already
    /// stale (an upstream reorg mid-fetch) and fails the pass.
    pub async fn fetch_block_events(
        &self,
        range: BlockRange,
    ) -> Result<Vec<BlockEvent>, IndexerError> {
        let headers = self.client.headers_in_range(range).await?;

        for pair in headers.windows(2) {
            if pair[1].parent_hash != pair[0].hash {
                return Err(IndexerError::BrokenChain {
                    number: pair[1].number,
                    expected: pair[1].parent_hash.clone(),
                    actual: pair[0].hash.clone(),
                });
            }
        }

        let mut blocks: Vec<BlockEvent> = headers.into_iter().map(BlockEvent::bare).collect();

        let filters = self.registry.filters_for(range.from, range.to);
        if filters.is_empty() {
            return Ok(blocks);
        }

        let mut topics: Vec<String> = filters.iter().map(|f| f.topic.clone()).collect();
        topics.sort();

        // One address restriction covers all topics, so it can only apply
        // when every filter carries one; a single wildcard filter drops it.
        let addresses = filters
            .iter()
            .map(|f| f.addresses.clone())
            .collect::<Option<Vec<_>>>()
            .map(|lists| {
                let mut merged: Vec<String> = Vec::new();
                for address in lists.into_iter().flatten() {
                    if !merged.contains(&address) {
                        merged.push(address);
                    }
                }
                merged
            });

        let logs = self
            .client
            .logs(&LogQuery {
                range,
                topics,
                addresses,
            })
            .await?;

        for log in logs {
            let block = blocks
                .iter_mut()
                .find(|b| b.header.hash == log.block_hash)
                .ok_or_else(|| IndexerError::UnknownBlockHash {
                    block_hash: log.block_hash.clone(),
                })?;
            block.logs.push(log);
        }

        Ok(blocks)
    }
}
