//! Timestamp to block height resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use revindex_shared::Result;

use crate::rpc::RpcClient;

/// Resolves the first block produced at or after a timestamp.
pub struct BlockLookup {
    rpc: Arc<RpcClient>,
}

impl BlockLookup {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    /// Binary search over `eth_getBlockByNumber` between genesis and head.
    ///
    /// Returns the head when every block is older than `at`.
    #[instrument(skip(self), fields(at = %at))]
    pub async fn block_at_or_after(&self, at: DateTime<Utc>) -> Result<u64> {
        let head = self.rpc.block_number().await?;
        let head_time = self.rpc.block_by_number(head).await?.timestamp()?;
        if head_time < at {
            return Ok(head);
        }

        let (mut lo, mut hi) = (0u64, head);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_time = self.rpc.block_by_number(mid).await?.timestamp()?;
            if mid_time < at {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        debug!(block = lo, head, "resolved start block");
        Ok(lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Simulated chain: block `n` has timestamp `GENESIS + n * 12`.
    struct FakeChain {
        head: u64,
    }

    const GENESIS: u64 = 1_600_000_000;

    impl Respond for FakeChain {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let result = match body["method"].as_str().unwrap() {
                "eth_blockNumber" => json!(format!("{:#x}", self.head)),
                "eth_getBlockByNumber" => {
                    let tag = body["params"][0].as_str().unwrap();
                    let n = crate::rpc::parse_quantity(tag).unwrap();
                    json!({
                        "number": tag,
                        "hash": format!("0x{n:064x}"),
                        "timestamp": format!("{:#x}", GENESIS + n * 12),
                    })
                }
                other => panic!("unexpected method {other}"),
            };
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "result": result,
            }))
        }
    }

    async fn lookup(head: u64) -> (MockServer, BlockLookup) {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(FakeChain { head })
            .mount(&server)
            .await;
        let rpc = Arc::new(RpcClient::new(&server.uri()).unwrap());
        (server, BlockLookup::new(rpc))
    }

    #[tokio::test]
    async fn finds_first_block_at_or_after_timestamp() {
        let (_server, lookup) = lookup(1000).await;

        let exact = Utc.timestamp_opt((GENESIS + 500 * 12) as i64, 0).unwrap();
        assert_eq!(lookup.block_at_or_after(exact).await.unwrap(), 500);

        let between = Utc.timestamp_opt((GENESIS + 500 * 12 + 5) as i64, 0).unwrap();
        assert_eq!(lookup.block_at_or_after(between).await.unwrap(), 501);
    }

    #[tokio::test]
    async fn future_timestamp_returns_head() {
        let (_server, lookup) = lookup(1000).await;
        let future = Utc.timestamp_opt((GENESIS + 2000 * 12) as i64, 0).unwrap();
        assert_eq!(lookup.block_at_or_after(future).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn ancient_timestamp_returns_genesis() {
        let (_server, lookup) = lookup(1000).await;
        let old = Utc.timestamp_opt(1_000, 0).unwrap();
        assert_eq!(lookup.block_at_or_after(old).await.unwrap(), 0);
    }
}
