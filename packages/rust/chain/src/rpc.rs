//! Minimal EVM JSON-RPC client over `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use revindex_shared::{IndexerError, Result};

/// Timeout applied to every RPC request.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub block_hash: String,
    pub transaction_hash: String,
    #[serde(default)]
    pub log_index: Option<String>,
}

/// The subset of a block header the sources need.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlock {
    pub number: String,
    pub hash: String,
    pub timestamp: String,
}

impl RpcBlock {
    pub fn timestamp(&self) -> Result<DateTime<Utc>> {
        let secs = parse_quantity(&self.timestamp)?;
        let secs = i64::try_from(secs)
            .map_err(|_| IndexerError::parse(format!("timestamp out of range: {secs}")))?;
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| IndexerError::parse(format!("invalid block timestamp {secs}")))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client bound to one endpoint.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(RPC_TIMEOUT)?,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one call and decode its `result`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc call");

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexerError::Adapter(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Adapter(format!("{method}: HTTP {status}")));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| IndexerError::Adapter(format!("{method}: malformed response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(IndexerError::Adapter(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }

        parsed
            .result
            .ok_or_else(|| IndexerError::Adapter(format!("{method}: empty result")))
    }

    pub async fn block_number(&self) -> Result<u64> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&hex)
    }

    pub async fn block_by_number(&self, number: u64) -> Result<RpcBlock> {
        self.call(
            "eth_getBlockByNumber",
            json!([format!("{number:#x}"), false]),
        )
        .await
    }

    pub async fn block_by_hash(&self, hash: &str) -> Result<RpcBlock> {
        self.call("eth_getBlockByHash", json!([hash, false])).await
    }

    /// Logs emitted by `address` with `topic0` between `from` and `to` inclusive.
    pub async fn logs(&self, address: &str, topic0: &str, from: u64, to: u64) -> Result<Vec<RpcLog>> {
        self.call(
            "eth_getLogs",
            json!([{
                "fromBlock": format!("{from:#x}"),
                "toBlock": format!("{to:#x}"),
                "address": address,
                "topics": [topic0],
            }]),
        )
        .await
    }
}

/// Parse a hex quantity such as `0x1b4`.
pub fn parse_quantity(s: &str) -> Result<u64> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| IndexerError::parse(format!("quantity without 0x prefix: {s}")))?;
    if digits.is_empty() {
        return Err(IndexerError::parse("empty quantity"));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| IndexerError::parse(format!("invalid quantity {s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[tokio::test]
    async fn call_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" })),
            )
            .mount(&server)
            .await;

        let rpc = RpcClient::new(&server.uri()).unwrap();
        assert_eq!(rpc.block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn rpc_error_becomes_adapter_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32005, "message": "query returned more than 10000 results" }
            })))
            .mount(&server)
            .await;

        let rpc = RpcClient::new(&server.uri()).unwrap();
        let err = rpc.block_number().await.unwrap_err();
        assert_eq!(err.kind(), "adapter");
        assert!(err.to_string().contains("-32005"));
    }

    #[tokio::test]
    async fn http_failure_becomes_adapter_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let rpc = RpcClient::new(&server.uri()).unwrap();
        let err = rpc.block_by_hash("0xabc").await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }
}
