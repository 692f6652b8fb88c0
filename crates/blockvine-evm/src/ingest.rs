//! Applies and retracts fetched blocks.
//!
//! `BlockIngest` ties the decoder, dispatcher, and block processor together:
//! one processed block is one storage transaction containing the block-level
//! emission, each decoded event's emission in log-index order, and every
//! subscriber mutation those produced. Deindexing mirrors it: events fire in
//! reverse log-index order, the block-level hook last.

use std::sync::Arc;

use tracing::info;

use blockvine_core::dispatch::{EventDispatcher, IndexingContext};
use blockvine_core::error::IndexerError;
use blockvine_core::types::{BlockEvent, LogEvent};
use blockvine_storage::{BlockProcessor, SqliteStore, LATEST_INDEXED_BLOCK};

use crate::decoder::LogDecoder;

pub struct BlockIngest {
    processor: BlockProcessor,
    dispatcher: Arc<EventDispatcher>,
    decoder: LogDecoder,
    store: SqliteStore,
}

impl BlockIngest {
    pub fn new(
        processor: BlockProcessor,
        dispatcher: Arc<EventDispatcher>,
        decoder: LogDecoder,
        store: SqliteStore,
    ) -> Self {
        Self {
            processor,
            dispatcher,
            decoder,
            store,
        }
    }

    fn decode_block(&self, block: &BlockEvent) -> Vec<LogEvent> {
        block
            .logs
            .iter()
            .filter_map(|log| self.decoder.decode(log, block.header.timestamp))
            .collect()
    }

    /// Apply blocks in ascending order, each as one atomic transaction, and
    /// advance the latest-indexed pointer after each commit.
    pub async fn index_blocks(&self, blocks: &[BlockEvent]) -> Result<(), IndexerError> {
        for block in blocks {
            let events = self.decode_block(block);
            let header = &block.header;
            let dispatcher = &self.dispatcher;
            let events_ref = &events;

            self.processor
                .process_block(header, |mut txn| async move {
                    {
                        let mut ctx = IndexingContext {
                            header,
                            txn: &mut txn,
                        };
                        dispatcher.emit_block_index(&mut ctx).await?;
                        for event in events_ref {
                            dispatcher.emit_event_index(&mut ctx, event).await?;
                        }
                    }
                    Ok(txn)
                })
                .await?;

            self.store.set_pointer(LATEST_INDEXED_BLOCK, header).await?;
            info!(
                block = header.number,
                events = events.len(),
                "block indexed"
            );
        }
        Ok(())
    }

    /// Retract blocks.
    ///
    /// Callers performing a multi-block reorg must pass blocks highest-first:
    /// undo logs assume the state immediately preceding each block's own
    /// application, so out-of-order reverts corrupt entity state.
    pub async fn deindex_blocks(&self, blocks: &[BlockEvent]) -> Result<(), IndexerError> {
        debug_assert!(
            blocks
                .windows(2)
                .all(|pair| pair[0].header.number > pair[1].header.number),
            "blocks must be reverted in descending order"
        );

        for block in blocks {
            let events = self.decode_block(block);
            let header = &block.header;
            let dispatcher = &self.dispatcher;
            let events_ref = &events;

            self.processor
                .revert_block(header.number, |mut txn| async move {
                    {
                        let mut ctx = IndexingContext {
                            header,
                            txn: &mut txn,
                        };
                        for event in events_ref.iter().rev() {
                            dispatcher.emit_event_deindex(&mut ctx, event).await?;
                        }
                        dispatcher.emit_block_deindex(&mut ctx).await?;
                    }
                    Ok(txn)
                })
                .await?;

            info!(
                block = header.number,
                events = events.len(),
                "block deindexed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blockvine_core::config::{ContractConfig, IndexerConfig, NetworkConfig};
    use blockvine_core::dispatch::{EventSubscriber, Subscriptions};
    use blockvine_core::registry::TopicRegistry;
    use blockvine_core::types::{BlockHeader, RawLog};
    use std::sync::Mutex;

    const TRANSFER_TOPIC: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
    const TOKEN_ADDRESS: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        async fn on_index(
            &self,
            _ctx: &mut IndexingContext<'_>,
            event: &LogEvent,
        ) -> Result<(), IndexerError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("index:{}", event.log.log_index));
            Ok(())
        }

        async fn on_deindex(
            &self,
            _ctx: &mut IndexingContext<'_>,
            event: &LogEvent,
        ) -> Result<(), IndexerError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("deindex:{}", event.log.log_index));
            Ok(())
        }
    }

    fn registry() -> Arc<TopicRegistry> {
        let abi = serde_json::json!([
            {
                "type": "event",
                "name": "Transfer",
                "inputs": [
                    { "name": "from", "type": "address", "indexed": true },
                    { "name": "to", "type": "address", "indexed": true },
                    { "name": "value", "type": "uint256", "indexed": false }
                ],
                "anonymous": false
            }
        ]);
        let config = IndexerConfig {
            network: NetworkConfig {
                rpc_url: "http://localhost:8545".into(),
                chain_id: 1,
            },
            contracts: [(
                "Token".to_string(),
                ContractConfig {
                    abi,
                    address: Some(TOKEN_ADDRESS.into()),
                    start_block: Some(100),
                    end_block: None,
                    exclude_events: vec![],
                },
            )]
            .into_iter()
            .collect(),
        };
        Arc::new(TopicRegistry::from_config(&config).unwrap())
    }

    fn transfer_log(block: &BlockHeader, log_index: u32) -> RawLog {
        RawLog {
            address: TOKEN_ADDRESS.into(),
            topics: vec![
                TRANSFER_TOPIC.into(),
                format!("0x{:064x}", 0x11u64),
                format!("0x{:064x}", 0x22u64),
            ],
            data: format!("0x{:064x}", 1_000u64),
            block_hash: block.hash.clone(),
            block_number: block.number,
            transaction_hash: format!("0xt{log_index}"),
            transaction_index: log_index,
            log_index,
        }
    }

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            hash: format!("0x{number:064x}"),
            parent_hash: format!("0x{:064x}", number - 1),
            number,
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn deindex_reverses_event_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscriptions::new();
        subs.on_event(
            "Token:Transfer",
            Arc::new(Recorder {
                calls: calls.clone(),
            }),
        );

        let registry = registry();
        let store = SqliteStore::in_memory().await.unwrap();
        let ingest = BlockIngest::new(
            BlockProcessor::new(store.clone()),
            Arc::new(EventDispatcher::new(registry.clone(), subs)),
            LogDecoder::new(registry),
            store.clone(),
        );

        let head = header(103);
        let block = BlockEvent {
            logs: vec![transfer_log(&head, 0), transfer_log(&head, 1)],
            header: head,
        };

        ingest.index_blocks(std::slice::from_ref(&block)).await.unwrap();
        assert!(store.block_record(103).await.unwrap().is_some());
        assert_eq!(
            store
                .get_pointer(LATEST_INDEXED_BLOCK)
                .await
                .unwrap()
                .unwrap()
                .number,
            103
        );

        ingest
            .deindex_blocks(std::slice::from_ref(&block))
            .await
            .unwrap();
        assert!(store.block_record(103).await.unwrap().is_none());

        // Indexed in log order, deindexed in reverse
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["index:0", "index:1", "deindex:1", "deindex:0"]
        );
    }
}
