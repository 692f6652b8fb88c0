//! JSON-RPC client for header and log retrieval, backed by `reqwest`.
//!
//! Header ranges use true HTTP batching: one POST carrying a JSON array of
//! `eth_getBlockByNumber` calls. Responses may arrive in any order, so they
//! are re-sorted by request id before decoding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use blockvine_core::error::IndexerError;
use blockvine_core::range::BlockRange;
use blockvine_core::types::{BlockHeader, RawLog};

/// One log query, as planned by the monitor for a block sub-range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub range: BlockRange,
    /// Event signature hashes, OR-ed in topic position 0.
    pub topics: Vec<String>,
    /// Address restriction; `None` matches any address.
    pub addresses: Option<Vec<String>>,
}

/// The RPC surface the sync engine consumes. Failures propagate; retry is
/// the sync loop's job, not the client's.
#[async_trait]
pub trait EthRpcClient: Send + Sync {
    /// Header of the current chain head.
    async fn latest_header(&self) -> Result<BlockHeader, IndexerError>;

    /// Headers for every block in `range`, in ascending block order.
    async fn headers_in_range(&self, range: BlockRange) -> Result<Vec<BlockHeader>, IndexerError>;

    /// Logs matching `query`, in on-chain order.
    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, IndexerError>;
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: serde_json::Value,
}

impl RpcRequest {
    fn new(id: u64, method: &'static str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn into_result(self) -> Result<serde_json::Value, IndexerError> {
        if let Some(err) = self.error {
            return Err(IndexerError::Rpc(format!(
                "RPC error {} (id {}): {}",
                err.code, self.id, err.message
            )));
        }
        match self.result {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(IndexerError::Rpc(format!("empty result for id {}", self.id))),
        }
    }
}

// ─── Parsing helpers ─────────────────────────────────────────────────────────

pub(crate) fn parse_hex_u64(value: &serde_json::Value, field: &str) -> Result<u64, IndexerError> {
    let s = value
        .as_str()
        .ok_or_else(|| IndexerError::Rpc(format!("{field}: expected hex string")))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| IndexerError::Rpc(format!("{field}: invalid hex quantity {s}: {e}")))
}

fn parse_str(value: &serde_json::Value, field: &str) -> Result<String, IndexerError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| IndexerError::Rpc(format!("{field}: expected string")))
}

pub(crate) fn header_from_json(block: &serde_json::Value) -> Result<BlockHeader, IndexerError> {
    Ok(BlockHeader {
        hash: parse_str(&block["hash"], "hash")?,
        parent_hash: parse_str(&block["parentHash"], "parentHash")?,
        number: parse_hex_u64(&block["number"], "number")?,
        timestamp: parse_hex_u64(&block["timestamp"], "timestamp")? as i64,
    })
}

pub(crate) fn log_from_json(log: &serde_json::Value) -> Result<RawLog, IndexerError> {
    let topics = log["topics"]
        .as_array()
        .ok_or_else(|| IndexerError::Rpc("topics: expected array".into()))?
        .iter()
        .map(|t| parse_str(t, "topics[]"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawLog {
        address: parse_str(&log["address"], "address")?,
        topics,
        data: parse_str(&log["data"], "data")?,
        block_hash: parse_str(&log["blockHash"], "blockHash")?,
        block_number: parse_hex_u64(&log["blockNumber"], "blockNumber")?,
        transaction_hash: parse_str(&log["transactionHash"], "transactionHash")?,
        transaction_index: parse_hex_u64(&log["transactionIndex"], "transactionIndex")? as u32,
        log_index: parse_hex_u64(&log["logIndex"], "logIndex")? as u32,
    })
}

// ─── HTTP implementation ─────────────────────────────────────────────────────

/// `EthRpcClient` over plain HTTP JSON-RPC.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }

    async fn send(&self, req: &RpcRequest) -> Result<serde_json::Value, IndexerError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexerError::Rpc(format!("HTTP {status}: {body}")));
        }

        resp.json::<RpcResponse>()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?
            .into_result()
    }

    /// Send all requests as a JSON array in one HTTP call.
    async fn send_batch(&self, reqs: &[RpcRequest]) -> Result<Vec<RpcResponse>, IndexerError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }

        let resp = self
            .http
            .post(&self.url)
            .json(reqs)
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexerError::Rpc(format!("HTTP {status}: {body}")));
        }

        resp.json::<Vec<RpcResponse>>()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))
    }
}

#[async_trait]
impl EthRpcClient for HttpRpcClient {
    async fn latest_header(&self) -> Result<BlockHeader, IndexerError> {
        let req = RpcRequest::new(
            1,
            "eth_getBlockByNumber",
            serde_json::json!(["latest", false]),
        );
        let block = self.send(&req).await?;
        header_from_json(&block)
    }

    async fn headers_in_range(&self, range: BlockRange) -> Result<Vec<BlockHeader>, IndexerError> {
        let reqs: Vec<RpcRequest> = (range.from..=range.to)
            .map(|number| {
                RpcRequest::new(
                    number,
                    "eth_getBlockByNumber",
                    serde_json::json!([format!("0x{number:x}"), false]),
                )
            })
            .collect();

        let mut responses = self.send_batch(&reqs).await?;
        if responses.len() != reqs.len() {
            return Err(IndexerError::Rpc(format!(
                "batch returned {} responses for {} requests",
                responses.len(),
                reqs.len()
            )));
        }

        // Servers may answer out of order; ids are the block numbers.
        responses.sort_by_key(|r| r.id);
        responses
            .into_iter()
            .map(|resp| header_from_json(&resp.into_result()?))
            .collect()
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, IndexerError> {
        let mut filter = serde_json::json!({
            "fromBlock": format!("0x{:x}", query.range.from),
            "toBlock": format!("0x{:x}", query.range.to),
            // Position 0 is an OR-list over event signature hashes
            "topics": [query.topics],
        });
        if let Some(addresses) = &query.addresses {
            filter["address"] = serde_json::json!(addresses);
        }

        let req = RpcRequest::new(1, "eth_getLogs", serde_json::json!([filter]));
        let result = self.send(&req).await?;

        result
            .as_array()
            .ok_or_else(|| IndexerError::Rpc("eth_getLogs: expected array".into()))?
            .iter()
            .map(log_from_json)
            .collect()
    }
}
