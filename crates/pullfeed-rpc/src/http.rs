//! JSON-RPC chain node over HTTP.

use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::node::{CallRequest, ChainNode};
use crate::{NodeError, Result};

/// Error code nodes use for a reverted `eth_call` or `eth_estimateGas`.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Chain node reached through an HTTP JSON-RPC endpoint.
pub struct HttpNode {
    client: reqwest::Client,
    url: String,
}

impl HttpNode {
    /// Create a node client for `url`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let body = build_jsonrpc_request(method, params);
        trace!(method, "sending rpc request");
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NodeError::Transport(format!("{method}: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| NodeError::Transport(format!("reading {method} response: {e}")))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                NodeError::InvalidResponse(format!("{method}: invalid JSON: {e}"))
            } else {
                NodeError::Transport(format!("{method}: HTTP {status}: {text}"))
            }
        })?;
        parse_result(value)
    }
}

#[async_trait]
impl ChainNode for HttpNode {
    async fn call(&self, request: &CallRequest) -> Result<Bytes> {
        let result = self
            .rpc_call("eth_call", json!([call_object(request), "latest"]))
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| NodeError::InvalidResponse("eth_call result is not a string".into()))?;
        parse_hex_bytes(raw, "eth_call")
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64> {
        let result = self
            .rpc_call("eth_estimateGas", json!([call_object(request)]))
            .await?;
        parse_hex_u64(&result, "eth_estimateGas")
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        let result = self
            .rpc_call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_hex_u64(&result, "eth_getTransactionCount")
    }

    async fn block_timestamp(&self) -> Result<u64> {
        let result = self
            .rpc_call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let timestamp = result.get("timestamp").ok_or_else(|| {
            NodeError::InvalidResponse("eth_getBlockByNumber: missing timestamp".into())
        })?;
        parse_hex_u64(timestamp, "block timestamp")
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let payload = format!("0x{}", hex::encode(raw));
        let result = self
            .rpc_call("eth_sendRawTransaction", json!([payload]))
            .await?;
        let hash = result
            .as_str()
            .and_then(|s| s.parse::<B256>().ok())
            .ok_or_else(|| {
                NodeError::InvalidResponse(format!("eth_sendRawTransaction result: {result}"))
            })?;
        debug!(hash = %hash, "transaction submitted");
        Ok(hash)
    }

    async fn chain_id(&self) -> Result<u64> {
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        parse_hex_u64(&result, "eth_chainId")
    }
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// Build a JSON-RPC 2.0 request body.
pub(crate) fn build_jsonrpc_request(method: &str, params: Value) -> RpcRequest<'_> {
    RpcRequest {
        jsonrpc: "2.0",
        id: 1,
        method,
        params,
    }
}

fn call_object(request: &CallRequest) -> Value {
    let mut object = json!({
        "to": request.to,
        "value": format!("0x{:x}", request.value),
        "data": request.data,
    });
    if let (Some(from), Some(map)) = (request.from, object.as_object_mut()) {
        map.insert("from".to_string(), json!(from));
    }
    object
}

/// Split a JSON-RPC response into its result or a typed error.
pub(crate) fn parse_result(response: Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        if let Some(data) = error.get("data").and_then(revert_data) {
            return Err(NodeError::Reverted { data, message });
        }
        // Reverts without data surface as reverts with empty bytes.
        if code == EXECUTION_REVERTED_CODE || message.starts_with("execution reverted") {
            return Err(NodeError::Reverted {
                data: Bytes::new(),
                message,
            });
        }
        return Err(NodeError::Rpc { code, message });
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| NodeError::InvalidResponse("missing 'result' field".to_string()))
}

/// Revert bytes carried in a JSON-RPC error `data` field.
///
/// Accepts a bare hex string, or an object nesting one under `data`.
fn revert_data(data: &Value) -> Option<Bytes> {
    match data {
        Value::String(s) => {
            let digits = s.strip_prefix("0x")?;
            hex::decode(digits).ok().map(Bytes::from)
        }
        Value::Object(map) => map.get("data").and_then(revert_data),
        _ => None,
    }
}

fn parse_hex_bytes(raw: &str, field: &str) -> Result<Bytes> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| NodeError::InvalidResponse(format!("{field}: {e}")))
}

fn parse_hex_u64(value: &Value, field: &str) -> Result<u64> {
    let raw = value
        .as_str()
        .ok_or_else(|| NodeError::InvalidResponse(format!("{field}: expected hex string")))?;
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| NodeError::InvalidResponse(format!("{field}: must be 0x-prefixed")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| NodeError::InvalidResponse(format!("{field}: {e}")))
}
