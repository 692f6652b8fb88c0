//! Subscriber traits and the event dispatcher.
//!
//! Subscribers register interest before the monitor starts: block subscribers
//! see every processed block, event subscribers see decoded logs whose
//! `"Contract:Event"` pattern matches. Dispatch is sequential in registration
//! order inside the block's storage transaction, so a subscriber error aborts
//! the whole block and nothing it wrote survives.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::pattern::matches_event_pattern;
use crate::registry::TopicRegistry;
use crate::types::{BlockHeader, LogEvent};

// ─── Mutation seam ───────────────────────────────────────────────────────────

/// Entity mutations available to subscribers inside a block transaction.
///
/// Every mutation records its inverse in the block's undo log, so a later
/// revert of the block restores storage byte for byte. Implemented by the
/// storage crate; object-safe so subscribers stay storage-agnostic.
#[async_trait]
pub trait EntityTxn: Send {
    /// Insert a new entity into `collection`, returning its assigned id.
    async fn insert(
        &mut self,
        collection: &str,
        data: serde_json::Value,
    ) -> Result<i64, IndexerError>;

    /// Replace the entity `(collection, id)` with `data`. Fails if absent.
    async fn update(
        &mut self,
        collection: &str,
        id: i64,
        data: serde_json::Value,
    ) -> Result<(), IndexerError>;

    /// Delete the entity `(collection, id)`. Fails if absent.
    async fn delete(&mut self, collection: &str, id: i64) -> Result<(), IndexerError>;

    /// Fetch the entity `(collection, id)`, if it exists.
    async fn get(
        &mut self,
        collection: &str,
        id: i64,
    ) -> Result<Option<serde_json::Value>, IndexerError>;
}

/// Per-emission context handed to subscribers.
pub struct IndexingContext<'a> {
    /// Header of the block being indexed or deindexed.
    pub header: &'a BlockHeader,
    /// Open transaction for this block's mutations.
    pub txn: &'a mut dyn EntityTxn,
}

// ─── Subscriber traits ───────────────────────────────────────────────────────

/// Hook invoked once per block, before (index) or after (deindex) the
/// block's events.
#[async_trait]
pub trait BlockSubscriber: Send + Sync {
    /// Called when the block is applied.
    async fn on_index(&self, _ctx: &mut IndexingContext<'_>) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Called when the block is reverted.
    async fn on_deindex(&self, _ctx: &mut IndexingContext<'_>) -> Result<(), IndexerError> {
        Ok(())
    }
}

/// Hook invoked for every decoded event matching the registration pattern.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Called when the containing block is applied.
    async fn on_index(
        &self,
        _ctx: &mut IndexingContext<'_>,
        _event: &LogEvent,
    ) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Called when the containing block is reverted.
    async fn on_deindex(
        &self,
        _ctx: &mut IndexingContext<'_>,
        _event: &LogEvent,
    ) -> Result<(), IndexerError> {
        Ok(())
    }
}

// ─── Registration ────────────────────────────────────────────────────────────

/// Subscriber registrations collected before the monitor starts.
///
/// Order of registration is dispatch order.
#[derive(Default)]
pub struct Subscriptions {
    blocks: Vec<Arc<dyn BlockSubscriber>>,
    events: Vec<(String, Arc<dyn EventSubscriber>)>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block-level subscriber.
    pub fn on_block(&mut self, subscriber: Arc<dyn BlockSubscriber>) -> &mut Self {
        self.blocks.push(subscriber);
        self
    }

    /// Register an event subscriber under a `"Contract:Event"` pattern.
    /// `*` wildcards either segment.
    pub fn on_event(
        &mut self,
        pattern: impl Into<String>,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> &mut Self {
        self.events.push((pattern.into(), subscriber));
        self
    }
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// Routes block and event emissions to registered subscribers.
pub struct EventDispatcher {
    registry: Arc<TopicRegistry>,
    blocks: Vec<Arc<dyn BlockSubscriber>>,
    events: Vec<(String, Arc<dyn EventSubscriber>)>,
}

impl EventDispatcher {
    /// Seal the registration queue into a dispatcher.
    pub fn new(registry: Arc<TopicRegistry>, subscriptions: Subscriptions) -> Self {
        Self {
            registry,
            blocks: subscriptions.blocks,
            events: subscriptions.events,
        }
    }

    /// Emit the block-index hook to all block subscribers.
    pub async fn emit_block_index(
        &self,
        ctx: &mut IndexingContext<'_>,
    ) -> Result<(), IndexerError> {
        for subscriber in &self.blocks {
            subscriber.on_index(ctx).await?;
        }
        Ok(())
    }

    /// Emit the block-deindex hook to all block subscribers.
    pub async fn emit_block_deindex(
        &self,
        ctx: &mut IndexingContext<'_>,
    ) -> Result<(), IndexerError> {
        for subscriber in &self.blocks {
            subscriber.on_deindex(ctx).await?;
        }
        Ok(())
    }

    /// Emit a decoded event to every subscriber whose pattern matches.
    pub async fn emit_event_index(
        &self,
        ctx: &mut IndexingContext<'_>,
        event: &LogEvent,
    ) -> Result<(), IndexerError> {
        let contract = self.registry.contract_name_for_address(&event.log.address);
        for (pattern, subscriber) in &self.events {
            if matches_event_pattern(contract, &event.name, pattern) {
                subscriber.on_index(ctx, event).await?;
            }
        }
        Ok(())
    }

    /// Emit a decoded event's deindex hook to every matching subscriber.
    pub async fn emit_event_deindex(
        &self,
        ctx: &mut IndexingContext<'_>,
        event: &LogEvent,
    ) -> Result<(), IndexerError> {
        let contract = self.registry.contract_name_for_address(&event.log.address);
        for (pattern, subscriber) in &self.events {
            if matches_event_pattern(contract, &event.name, pattern) {
                subscriber.on_deindex(ctx, event).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContractConfig, IndexerConfig, NetworkConfig};
    use crate::types::RawLog;
    use std::sync::Mutex;

    /// In-memory `EntityTxn` that records call names, for dispatch-order
    /// assertions.
    struct RecordingTxn {
        calls: Vec<String>,
    }

    #[async_trait]
    impl EntityTxn for RecordingTxn {
        async fn insert(
            &mut self,
            collection: &str,
            _data: serde_json::Value,
        ) -> Result<i64, IndexerError> {
            self.calls.push(format!("insert:{collection}"));
            Ok(1)
        }

        async fn update(
            &mut self,
            collection: &str,
            id: i64,
            _data: serde_json::Value,
        ) -> Result<(), IndexerError> {
            self.calls.push(format!("update:{collection}:{id}"));
            Ok(())
        }

        async fn delete(&mut self, collection: &str, id: i64) -> Result<(), IndexerError> {
            self.calls.push(format!("delete:{collection}:{id}"));
            Ok(())
        }

        async fn get(
            &mut self,
            _collection: &str,
            _id: i64,
        ) -> Result<Option<serde_json::Value>, IndexerError> {
            Ok(None)
        }
    }

    struct NamedSubscriber {
        name: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventSubscriber for NamedSubscriber {
        async fn on_index(
            &self,
            _ctx: &mut IndexingContext<'_>,
            event: &LogEvent,
        ) -> Result<(), IndexerError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.name));
            Ok(())
        }
    }

    struct CountingBlockSubscriber {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl BlockSubscriber for CountingBlockSubscriber {
        async fn on_index(&self, ctx: &mut IndexingContext<'_>) -> Result<(), IndexerError> {
            self.seen.lock().unwrap().push(ctx.header.number);
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
                    address: Some("0xabc0000000000000000000000000000000000001".into()),
                    start_block: None,
                    end_block: None,
                    exclude_events: vec![],
                },
            )]
            .into_iter()
            .collect(),
        };
        Arc::new(TopicRegistry::from_config(&config).unwrap())
    }

    fn header() -> BlockHeader {
        BlockHeader {
            hash: "0xbbb".into(),
            parent_hash: "0xaaa".into(),
            number: 100,
            timestamp: 1000,
        }
    }

    fn transfer_event() -> LogEvent {
        LogEvent {
            log: RawLog {
                address: "0xabc0000000000000000000000000000000000001".into(),
                topics: vec![],
                data: "0x".into(),
                block_hash: "0xbbb".into(),
                block_number: 100,
                transaction_hash: "0xt1".into(),
                transaction_index: 0,
                log_index: 0,
            },
            block_timestamp: 1000,
            name: "Transfer".into(),
            fields: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn dispatches_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscriptions::new();
        subs.on_event(
            "Token:Transfer",
            Arc::new(NamedSubscriber {
                name: "first",
                seen: seen.clone(),
            }),
        );
        subs.on_event(
            "*:*",
            Arc::new(NamedSubscriber {
                name: "second",
                seen: seen.clone(),
            }),
        );

        let dispatcher = EventDispatcher::new(registry(), subs);
        let header = header();
        let mut txn = RecordingTxn { calls: Vec::new() };
        let mut ctx = IndexingContext {
            header: &header,
            txn: &mut txn,
        };

        dispatcher
            .emit_event_index(&mut ctx, &transfer_event())
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:Transfer".to_string(), "second:Transfer".to_string()]
        );
    }

    #[tokio::test]
    async fn non_matching_pattern_is_skipped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscriptions::new();
        subs.on_event(
            "Other:Transfer",
            Arc::new(NamedSubscriber {
                name: "skipped",
                seen: seen.clone(),
            }),
        );

        let dispatcher = EventDispatcher::new(registry(), subs);
        let header = header();
        let mut txn = RecordingTxn { calls: Vec::new() };
        let mut ctx = IndexingContext {
            header: &header,
            txn: &mut txn,
        };

        dispatcher
            .emit_event_index(&mut ctx, &transfer_event())
            .await
            .unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn block_subscribers_see_every_block() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscriptions::new();
        subs.on_block(Arc::new(CountingBlockSubscriber { seen: seen.clone() }));

        let dispatcher = EventDispatcher::new(registry(), subs);
        let header = header();
        let mut txn = RecordingTxn { calls: Vec::new() };
        let mut ctx = IndexingContext {
            header: &header,
            txn: &mut txn,
        };

        dispatcher.emit_block_index(&mut ctx).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[tokio::test]
    async fn subscriber_error_propagates() {
        struct Failing;

        #[async_trait]
        impl EventSubscriber for Failing {
            async fn on_index(
                &self,
                _ctx: &mut IndexingContext<'_>,
                _event: &LogEvent,
            ) -> Result<(), IndexerError> {
                Err(IndexerError::Subscriber("boom".into()))
            }
        }

        let mut subs = Subscriptions::new();
        subs.on_event("*:*", Arc::new(Failing));

        let dispatcher = EventDispatcher::new(registry(), subs);
        let header = header();
        let mut txn = RecordingTxn { calls: Vec::new() };
        let mut ctx = IndexingContext {
            header: &header,
            txn: &mut txn,
        };

        let err = dispatcher
            .emit_event_index(&mut ctx, &transfer_event())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Subscriber(_)));
    }
}
