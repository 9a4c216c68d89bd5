//! Swap client: bridged stablecoin -> storage token on the destination
//! exchange.
//!
//! Endpoints:
//! - POST /v1/swap

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use blobpay_quote::price::PriceOracle;
use blobpay_types::{Hex, RelayError, Result, SwapResult, SwapStatus};

/// Executes a swap between the bridged stablecoin and the storage token.
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait SwapClient: Send + Sync {
    /// Swap `input_amount` stablecoin for at least `min_output_amount`
    /// storage tokens. A fill below the minimum must be rejected with
    /// `SlippageExceeded`, never silently accepted.
    async fn swap(
        &self,
        input_amount: Decimal,
        min_output_amount: Decimal,
        account: &str,
    ) -> Result<SwapResult>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequestBody {
    base: String,
    quote: String,
    input_amount: Decimal,
    min_output_amount: Decimal,
    sender: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponseBody {
    output_amount: Decimal,
    tx_digest: Hex,
}

/// Swap client backed by the destination exchange's HTTP API.
pub struct DexSwapClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    oracle: Arc<dyn PriceOracle>,
    base_symbol: String,
    quote_symbol: String,
}

impl DexSwapClient {
    pub fn new(
        base_url: &str,
        oracle: Arc<dyn PriceOracle>,
        base_symbol: &str,
        quote_symbol: &str,
        timeout_ms: Option<u64>,
    ) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
            oracle,
            base_symbol: base_symbol.to_string(),
            quote_symbol: quote_symbol.to_string(),
        }
    }
}

#[async_trait]
impl SwapClient for DexSwapClient {
    async fn swap(
        &self,
        input_amount: Decimal,
        min_output_amount: Decimal,
        account: &str,
    ) -> Result<SwapResult> {
        if input_amount <= Decimal::ZERO {
            return Err(RelayError::InvalidInput(format!(
                "swap input must be positive, got {}",
                input_amount
            )));
        }

        // pre-trade check against the current rate; the venue still
        // enforces the minimum on the actual fill
        let rate = self.oracle.stable_to_token_rate().await?;
        let expected_output = input_amount * rate;
        if expected_output < min_output_amount {
            return Err(RelayError::SlippageExceeded {
                min_output: min_output_amount,
                realized_output: expected_output,
            });
        }
        debug!(%input_amount, %expected_output, "submitting swap");

        let body = SwapRequestBody {
            base: self.base_symbol.clone(),
            quote: self.quote_symbol.clone(),
            input_amount,
            min_output_amount,
            sender: account.to_string(),
        };
        let url = format!("{}/v1/swap", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Other(format!("swap request failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RelayError::LiquidityUnavailable(format!(
                "no route between {} and {}",
                self.base_symbol, self.quote_symbol
            )));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::Other(format!(
                "swap venue returned status {}: {}",
                status, text
            )));
        }

        let fill: SwapResponseBody = resp
            .json()
            .await
            .map_err(|e| RelayError::Other(format!("failed to parse swap response: {}", e)))?;

        if fill.output_amount < min_output_amount {
            return Err(RelayError::SlippageExceeded {
                min_output: min_output_amount,
                realized_output: fill.output_amount,
            });
        }

        info!(digest = %fill.tx_digest, %fill.output_amount, "swap executed");
        Ok(SwapResult {
            input_amount,
            output_amount: fill.output_amount,
            destination_tx_digest: fill.tx_digest,
            status: SwapStatus::Executed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FixedOracle(Decimal);

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn stable_to_token_rate(&self) -> Result<Decimal> {
            Ok(self.0)
        }
    }

    fn client(rate: Decimal) -> DexSwapClient {
        DexSwapClient::new(
            "http://127.0.0.1:1",
            Arc::new(FixedOracle(rate)),
            "USDC",
            "WAL",
            Some(50),
        )
    }

    #[tokio::test]
    async fn test_pre_trade_slippage_rejection() {
        // 430.08 in at 0.4 -> 172.032 out, below the 204.8 minimum;
        // rejected before any submission
        let err = client(dec!(0.4))
            .swap(dec!(430.08), dec!(204.8), "0xabc")
            .await
            .unwrap_err();
        match err {
            RelayError::SlippageExceeded {
                min_output,
                realized_output,
            } => {
                assert_eq!(min_output, dec!(204.8));
                assert_eq!(realized_output, dec!(172.032));
            }
            other => panic!("expected SlippageExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_positive_input_rejected() {
        let err = client(dec!(0.5))
            .swap(Decimal::ZERO, dec!(1), "0xabc")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
    }

    #[test]
    fn test_swap_request_wire_shape() {
        let body = SwapRequestBody {
            base: "USDC".into(),
            quote: "WAL".into(),
            input_amount: dec!(430.08),
            min_output_amount: dec!(204.8),
            sender: "0xabc".into(),
        };
        let encoded = serde_json::to_value(&body).unwrap();
        assert!(encoded.get("inputAmount").is_some());
        assert!(encoded.get("minOutputAmount").is_some());
        assert!(encoded.get("sender").is_some());
    }

    #[test]
    fn test_swap_response_parsing() {
        let fill: SwapResponseBody =
            serde_json::from_str(r#"{"outputAmount": "205.3", "txDigest": "0xd1"}"#).unwrap();
        assert_eq!(fill.output_amount, dec!(205.3));
        assert_eq!(fill.tx_digest, "0xd1");
    }
}
