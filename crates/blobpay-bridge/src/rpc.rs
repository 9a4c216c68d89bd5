//! Minimal JSON-RPC 2.0 client for chain endpoints.
//!
//! Methods used:
//! - eth_sendTransaction
//! - eth_getTransactionReceipt

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use blobpay_types::{Hex, RelayError, Result};

/// Transaction submission parameters. Signing is delegated to the node's
/// managed account; key handling is outside this crate.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionCall {
    pub from: Hex,
    pub to: Hex,
    pub data: Hex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Hex>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Hex,
    pub topics: Vec<Hex>,
    pub data: Hex,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: Hex,
    /// "0x1" on success, "0x0" on revert.
    pub status: Hex,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == "0x1"
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client for transaction submission and receipt lookup.
pub struct ChainRpcClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ChainRpcClient {
    pub fn new(url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Other(format!("rpc request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(RelayError::Other(format!(
                "rpc endpoint returned status {}",
                resp.status()
            )));
        }

        let body: RpcResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Other(format!("failed to parse rpc response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(RelayError::Other(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }

        Ok(body.result)
    }

    /// Submit a transaction; returns its hash once accepted by the node.
    pub async fn send_transaction(&self, call: &TransactionCall) -> Result<Hex> {
        let result = self
            .call("eth_sendTransaction", json!([call]))
            .await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RelayError::Other("rpc returned no transaction hash".into()))
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>> {
        let result = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| RelayError::Other(format!("failed to parse receipt: {}", e)))
    }

    /// Poll for a receipt until the transaction is included, bounded.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        max_attempts: u32,
        poll_interval_ms: u64,
    ) -> Result<TransactionReceipt> {
        for attempt in 0..max_attempts {
            if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if attempt + 1 < max_attempts {
                tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
            }
        }
        Err(RelayError::Other(format!(
            "receipt not available after {} attempts for tx {}",
            max_attempts, tx_hash
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_parsing_and_status() {
        let raw = r#"{
            "transactionHash": "0xabc",
            "status": "0x1",
            "logs": [
                {"address": "0x19330d10d9cc8751218eaf51e8885d058642e08a",
                 "topics": ["0x0f6798a560793a54c3bcfe86a93cde1e73087d944c0ea20544137d4121396885"],
                 "data": "0x00"}
            ]
        }"#;
        let receipt: TransactionReceipt = serde_json::from_str(raw).unwrap();
        assert!(receipt.is_success());
        assert_eq!(receipt.logs.len(), 1);

        let reverted: TransactionReceipt =
            serde_json::from_str(r#"{"transactionHash": "0xdef", "status": "0x0"}"#).unwrap();
        assert!(!reverted.is_success());
        assert!(reverted.logs.is_empty());
    }

    #[test]
    fn test_transaction_call_omits_absent_value() {
        let call = TransactionCall {
            from: "0x1".into(),
            to: "0x2".into(),
            data: "0x3".into(),
            value: None,
        };
        let encoded = serde_json::to_value(&call).unwrap();
        assert!(encoded.get("value").is_none());
    }
}
