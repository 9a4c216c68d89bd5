//! Price source for the stablecoin / storage-token pair.
//!
//! Endpoints:
//! - GET /v1/price?base=<stable>&quote=<token>

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use blobpay_types::{RelayError, Result};

/// Exchange-rate source between the bridged stablecoin and the storage
/// token. Implementations must be safe for concurrent use.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Storage-token units received per one stablecoin unit.
    async fn stable_to_token_rate(&self) -> Result<Decimal>;
}

/// Price endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceResponse {
    pub base: String,
    pub quote: String,
    pub rate: Decimal,
}

/// Oracle backed by the destination exchange's price endpoint.
pub struct DexPriceOracle {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    base_symbol: String,
    quote_symbol: String,
}

impl DexPriceOracle {
    pub fn new(
        base_url: &str,
        base_symbol: &str,
        quote_symbol: &str,
        timeout_ms: Option<u64>,
    ) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(10_000);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
            base_symbol: base_symbol.to_string(),
            quote_symbol: quote_symbol.to_string(),
        }
    }
}

#[async_trait]
impl PriceOracle for DexPriceOracle {
    async fn stable_to_token_rate(&self) -> Result<Decimal> {
        let url = format!(
            "{}/v1/price?base={}&quote={}",
            self.base_url, self.base_symbol, self.quote_symbol
        );

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::PriceUnavailable(format!("price request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(RelayError::PriceUnavailable(format!(
                "price endpoint returned status {}",
                resp.status()
            )));
        }

        let body: PriceResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::PriceUnavailable(format!("failed to parse price response: {}", e)))?;

        if body.rate <= Decimal::ZERO {
            return Err(RelayError::PriceUnavailable(format!(
                "non-positive rate {} for {}/{}",
                body.rate, body.base, body.quote
            )));
        }

        Ok(body.rate)
    }
}
