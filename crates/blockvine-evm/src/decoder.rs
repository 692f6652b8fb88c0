//! Log decoding against registry schemas.
//!
//! Decode failures are expected background noise (another contract's event
//! can share a topic hash with an incompatible payload) and are swallowed:
//! a malformed log yields no event, never an error that could abort block
//! processing.

use std::sync::Arc;

use alloy_core::dyn_abi::{DynSolType, DynSolValue};

use blockvine_core::error::IndexerError;
use blockvine_core::registry::{TopicEntry, TopicRegistry};
use blockvine_core::types::{LogEvent, RawLog};

/// Decodes raw logs into typed events using the topic registry's schemas.
#[derive(Clone)]
pub struct LogDecoder {
    registry: Arc<TopicRegistry>,
}

impl LogDecoder {
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self { registry }
    }

    /// Decode one raw log.
    ///
    /// Returns `None` when the topic is unregistered, the emitting address
    /// is not covered, or the payload does not decode against the schema.
    pub fn decode(&self, log: &RawLog, block_timestamp: i64) -> Option<LogEvent> {
        let topic0 = log.topic0()?;
        let entry = self.registry.entry(topic0)?;
        if !entry.covers_address(&log.address) {
            return None;
        }

        match decode_fields(entry, log) {
            Ok(fields) => Some(LogEvent {
                log: log.clone(),
                block_timestamp,
                name: entry.event_name.clone(),
                fields,
            }),
            Err(e) => {
                tracing::trace!(
                    topic = topic0,
                    block = log.block_number,
                    log_index = log.log_index,
                    error = %e,
                    "undecodable log skipped"
                );
                None
            }
        }
    }
}

/// Decode all parameters of `log` against the entry's event fragment,
/// returning a name-keyed JSON object.
fn decode_fields(entry: &TopicEntry, log: &RawLog) -> Result<serde_json::Value, IndexerError> {
    let data_types: Vec<DynSolType> = entry
        .event
        .inputs
        .iter()
        .filter(|p| !p.indexed)
        .map(|p| parse_type(&p.selector_type()))
        .collect::<Result<_, _>>()?;

    let mut data_values = decode_data(&log.data, data_types)?.into_iter();

    let mut fields = serde_json::Map::new();
    let mut topic_idx = 1usize; // topics[0] is the event signature hash

    for param in &entry.event.inputs {
        let value = if param.indexed {
            let topic = log.topics.get(topic_idx).ok_or_else(|| {
                IndexerError::Rpc(format!("missing topic {topic_idx} for {}", param.name))
            })?;
            topic_idx += 1;
            decode_topic(topic, &parse_type(&param.selector_type())?)?
        } else {
            data_values
                .next()
                .ok_or_else(|| IndexerError::Rpc(format!("missing data for {}", param.name)))?
        };
        fields.insert(param.name.clone(), value);
    }

    Ok(serde_json::Value::Object(fields))
}

fn parse_type(ty: &str) -> Result<DynSolType, IndexerError> {
    DynSolType::parse(ty).map_err(|e| IndexerError::Config(format!("bad ABI type {ty}: {e}")))
}

/// Decode the non-indexed payload as an ABI parameter sequence.
fn decode_data(
    data: &str,
    types: Vec<DynSolType>,
) -> Result<Vec<serde_json::Value>, IndexerError> {
    if types.is_empty() {
        return Ok(vec![]);
    }

    let raw = hex::decode(data.strip_prefix("0x").unwrap_or(data))
        .map_err(|e| IndexerError::Rpc(format!("invalid log data hex: {e}")))?;

    let decoded = DynSolType::Tuple(types)
        .abi_decode_sequence(&raw)
        .map_err(|e| IndexerError::Rpc(format!("data decode: {e}")))?;

    let values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };
    Ok(values.into_iter().map(normalize).collect())
}

/// Decode one indexed topic (always a single 32-byte word).
///
/// Reference types (string, bytes, arrays, tuples) are stored as the keccak
/// hash of their encoding; the original value is unrecoverable, so the raw
/// hash is surfaced as-is.
fn decode_topic(topic: &str, ty: &DynSolType) -> Result<serde_json::Value, IndexerError> {
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => {
            return Ok(serde_json::Value::String(topic.to_string()));
        }
        _ => {}
    }

    let raw = hex::decode(topic.strip_prefix("0x").unwrap_or(topic))
        .map_err(|e| IndexerError::Rpc(format!("invalid topic hex: {e}")))?;
    let value = ty
        .abi_decode(&raw)
        .map_err(|e| IndexerError::Rpc(format!("topic decode: {e}")))?;
    Ok(normalize(value))
}

/// Lower a decoded value into JSON: numbers as decimal strings (they exceed
/// f64 range), byte-likes as `0x` hex, addresses lowercased.
fn normalize(value: DynSolValue) -> serde_json::Value {
    match value {
        DynSolValue::Address(a) => {
            serde_json::Value::String(format!("0x{}", hex::encode(a.as_slice())))
        }
        DynSolValue::Bool(b) => serde_json::Value::Bool(b),
        DynSolValue::Uint(u, _) => serde_json::Value::String(u.to_string()),
        DynSolValue::Int(i, _) => serde_json::Value::String(i.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            serde_json::Value::String(format!("0x{}", hex::encode(&word.as_slice()[..size])))
        }
        DynSolValue::Bytes(bytes) => {
            serde_json::Value::String(format!("0x{}", hex::encode(bytes)))
        }
        DynSolValue::String(s) => serde_json::Value::String(s),
        DynSolValue::Function(f) => {
            serde_json::Value::String(format!("0x{}", hex::encode(f.as_slice())))
        }
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) => {
            serde_json::Value::Array(values.into_iter().map(normalize).collect())
        }
        DynSolValue::Tuple(values) => {
            serde_json::Value::Array(values.into_iter().map(normalize).collect())
        }
        _ => serde_json::Value::Null,
    }
}
