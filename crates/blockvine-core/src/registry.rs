//! Topic registry / filter planner.
//!
//! Built once at configuration load: every configured contract's ABI is
//! expanded to its event fragments, excluded events are dropped, and each
//! remaining event is folded into a selector-keyed map. A topic hash
//! aggregates *all* contracts that emit an event with that exact signature,
//! regardless of which logical contract name produced it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{IndexerConfig, MAX_BLOCK_NUMBER, WILDCARD_ADDRESS};
use crate::error::IndexerError;

/// Inclusive block span during which a contract registration is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    pub start_block: u64,
    pub end_block: u64,
}

impl BlockSpan {
    /// Returns `true` if this span overlaps `[from, to]`.
    pub fn overlaps(&self, from: u64, to: u64) -> bool {
        self.start_block <= to && self.end_block >= from
    }
}

/// Registry entry for one event signature hash.
#[derive(Debug, Clone)]
pub struct TopicEntry {
    /// Event name (e.g. `"Transfer"`).
    pub event_name: String,
    /// The ABI event fragment used as the decode schema.
    pub event: alloy_json_abi::Event,
    /// Address (or wildcard) → active block span, in registration order.
    pub address_ranges: IndexMap<String, BlockSpan>,
}

impl TopicEntry {
    /// Returns `true` if `log_address` is covered by this entry's registered
    /// address set. Wildcard always matches; otherwise the comparison is a
    /// case-insensitive exact match.
    pub fn covers_address(&self, log_address: &str) -> bool {
        self.address_ranges.keys().any(|addr| {
            addr == WILDCARD_ADDRESS || addr.eq_ignore_ascii_case(log_address)
        })
    }
}

/// One topic filter to include in a log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    /// Event signature hash (`0x…`).
    pub topic: String,
    /// Concrete addresses to restrict to; `None` matches any address
    /// (wildcard presence subsumes specific addresses).
    pub addresses: Option<Vec<String>>,
}

/// Selector-keyed registry of every event the configuration cares about.
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    entries: IndexMap<String, TopicEntry>,
    /// (contract name, address) in registration order, for reverse lookup.
    contracts: Vec<(String, Option<String>)>,
    start_block: Option<u64>,
}

impl TopicRegistry {
    /// Build the registry from configuration. Fails if any contract ABI does
    /// not parse as standard ABI JSON.
    pub fn from_config(config: &IndexerConfig) -> Result<Self, IndexerError> {
        let mut entries: IndexMap<String, TopicEntry> = IndexMap::new();
        let mut contracts = Vec::with_capacity(config.contracts.len());

        for (name, contract) in &config.contracts {
            let abi: alloy_json_abi::JsonAbi =
                serde_json::from_value(contract.abi.clone()).map_err(|e| {
                    IndexerError::Config(format!("invalid ABI for contract {name}: {e}"))
                })?;

            let address = contract
                .address
                .clone()
                .unwrap_or_else(|| WILDCARD_ADDRESS.to_string());
            let span = BlockSpan {
                start_block: contract.start_block.unwrap_or(0),
                end_block: contract.end_block.unwrap_or(MAX_BLOCK_NUMBER),
            };

            for event in abi.events() {
                if contract.exclude_events.iter().any(|ex| ex == &event.name) {
                    continue;
                }

                let topic = format!("0x{}", hex::encode(event.selector()));

                match entries.get_mut(&topic) {
                    Some(entry) => {
                        entry.address_ranges.insert(address.clone(), span);
                    }
                    None => {
                        let mut address_ranges = IndexMap::new();
                        address_ranges.insert(address.clone(), span);
                        entries.insert(
                            topic,
                            TopicEntry {
                                event_name: event.name.clone(),
                                event: event.clone(),
                                address_ranges,
                            },
                        );
                    }
                }
            }

            contracts.push((name.clone(), contract.address.clone()));
        }

        let start_block = if contracts.is_empty() {
            None
        } else {
            Some(
                config
                    .contracts
                    .values()
                    .map(|c| c.start_block.unwrap_or(0))
                    .min()
                    .unwrap_or(0),
            )
        };

        tracing::info!(
            topics = entries.len(),
            contracts = contracts.len(),
            "topic registry built"
        );

        Ok(Self {
            entries,
            contracts,
            start_block,
        })
    }

    /// Look up the registry entry for an event signature hash.
    pub fn entry(&self, topic: &str) -> Option<&TopicEntry> {
        self.entries.get(topic)
    }

    /// Topic filters relevant for `[from, to]`.
    ///
    /// If the wildcard address is active in the window, the filter for that
    /// topic carries no address list at all, even if specific addresses are
    /// also active. Only when the wildcard is absent or inactive does the
    /// filter carry the concrete active-address list, in registration order.
    /// Topics with neither are omitted.
    pub fn filters_for(&self, from: u64, to: u64) -> Vec<TopicFilter> {
        let mut filters = Vec::new();

        for (topic, entry) in &self.entries {
            let wildcard_active = entry
                .address_ranges
                .get(WILDCARD_ADDRESS)
                .is_some_and(|span| span.overlaps(from, to));

            let active_addresses: Vec<String> = entry
                .address_ranges
                .iter()
                .filter(|(addr, span)| {
                    addr.as_str() != WILDCARD_ADDRESS && span.overlaps(from, to)
                })
                .map(|(addr, _)| addr.clone())
                .collect();

            if wildcard_active {
                filters.push(TopicFilter {
                    topic: topic.clone(),
                    addresses: None,
                });
            } else if !active_addresses.is_empty() {
                filters.push(TopicFilter {
                    topic: topic.clone(),
                    addresses: Some(active_addresses),
                });
            }
        }

        filters
    }

    /// Reverse lookup: the configured contract name owning `address`.
    pub fn contract_name_for_address(&self, address: &str) -> Option<&str> {
        self.contracts
            .iter()
            .find(|(_, addr)| {
                addr.as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(address))
            })
            .map(|(name, _)| name.as_str())
    }

    /// The minimum configured start block across all contracts, used to
    /// bootstrap an empty ledger. `None` when no contracts are configured.
    ///
    /// Contracts with disjoint ranges make this wasteful (blocks irrelevant
    /// to some contracts are still indexed); the minimum-start rule is kept
    /// for predictability.
    pub fn start_block(&self) -> Option<u64> {
        self.start_block
    }

    /// Number of registered topics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
