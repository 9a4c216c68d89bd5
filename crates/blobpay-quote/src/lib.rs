//! Storage cost model and user-facing quotes.
//!
//! - `StorageCostModel`: bytes x epochs -> storage-token amount
//! - `CostEstimator`: token amount + oracle rate -> stablecoin quote,
//!   with the slippage buffer applied once on the input side

pub mod price;

use rust_decimal::Decimal;
use std::sync::Arc;

use blobpay_types::{CostQuote, RelayError, Result};
use price::PriceOracle;

/// Slippage buffer applied to the stablecoin side of every quote (5%).
///
/// Single source of truth: the buffer must absorb price movement between
/// quote time and swap execution, and the swap's minimum output is the
/// unbuffered token requirement from the same quote.
pub fn slippage_buffer_pct() -> Decimal {
    Decimal::new(5, 2)
}

/// Converts a byte size into the storage-token amount required for a
/// retention period.
#[derive(Debug, Clone)]
pub struct StorageCostModel {
    per_byte_per_epoch_rate: Decimal,
}

impl Default for StorageCostModel {
    fn default() -> Self {
        // 0.001 token per byte per epoch
        Self {
            per_byte_per_epoch_rate: Decimal::new(1, 3),
        }
    }
}

impl StorageCostModel {
    pub fn new(per_byte_per_epoch_rate: Decimal) -> Self {
        Self {
            per_byte_per_epoch_rate,
        }
    }

    /// Token amount required to store `byte_size` bytes for
    /// `retention_epochs` epochs.
    pub fn required_tokens(&self, byte_size: u64, retention_epochs: u64) -> Result<Decimal> {
        if byte_size == 0 {
            return Err(RelayError::InvalidInput("byte size must be positive".into()));
        }
        if retention_epochs == 0 {
            return Err(RelayError::InvalidInput(
                "retention epochs must be positive".into(),
            ));
        }
        Ok(Decimal::from(byte_size) * self.per_byte_per_epoch_rate * Decimal::from(retention_epochs))
    }
}

/// Combines the storage cost model with the price oracle to produce a
/// caller-facing quote.
pub struct CostEstimator {
    model: StorageCostModel,
    oracle: Arc<dyn PriceOracle>,
}

impl CostEstimator {
    pub fn new(model: StorageCostModel, oracle: Arc<dyn PriceOracle>) -> Self {
        Self { model, oracle }
    }

    /// Quote the cost of storing `byte_size` bytes for `retention_epochs`.
    ///
    /// Monotonically non-decreasing in both arguments. All math stays in
    /// `Decimal`; rounding happens only at display boundaries.
    pub async fn estimate(&self, byte_size: u64, retention_epochs: u64) -> Result<CostQuote> {
        let token_amount = self.model.required_tokens(byte_size, retention_epochs)?;
        let rate = self.oracle.stable_to_token_rate().await?;
        if rate <= Decimal::ZERO {
            return Err(RelayError::PriceUnavailable(format!(
                "non-positive exchange rate {}",
                rate
            )));
        }

        let buffer = slippage_buffer_pct();
        let stablecoin_amount = token_amount / rate * (Decimal::ONE + buffer);

        Ok(CostQuote {
            byte_size,
            token_amount,
            stablecoin_amount,
            slippage_buffer_pct: buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FixedOracle(Decimal);

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn stable_to_token_rate(&self) -> Result<Decimal> {
            Ok(self.0)
        }
    }

    struct DownOracle;

    #[async_trait]
    impl PriceOracle for DownOracle {
        async fn stable_to_token_rate(&self) -> Result<Decimal> {
            Err(RelayError::PriceUnavailable("connection refused".into()))
        }
    }

    fn estimator(rate: Decimal) -> CostEstimator {
        CostEstimator::new(StorageCostModel::default(), Arc::new(FixedOracle(rate)))
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        // 1024 bytes x 0.001 rate x 200 epochs = 204.8 tokens;
        // 204.8 / 0.5 * 1.05 = 430.08 stablecoin
        let quote = estimator(dec!(0.5)).estimate(1024, 200).await.unwrap();
        assert_eq!(quote.byte_size, 1024);
        assert_eq!(quote.token_amount, dec!(204.8));
        assert_eq!(quote.stablecoin_amount, dec!(430.08));
        assert_eq!(quote.slippage_buffer_pct, dec!(0.05));
        assert_eq!(quote.min_swap_output(), dec!(204.8));
    }

    #[tokio::test]
    async fn test_estimate_monotonic_in_both_arguments() {
        let est = estimator(dec!(0.5));
        let base = est.estimate(1024, 200).await.unwrap();
        let bigger = est.estimate(2048, 200).await.unwrap();
        let longer = est.estimate(1024, 400).await.unwrap();

        assert!(bigger.token_amount >= base.token_amount);
        assert!(bigger.stablecoin_amount >= base.stablecoin_amount);
        assert!(longer.token_amount >= base.token_amount);
        assert!(longer.stablecoin_amount >= base.stablecoin_amount);
    }

    #[tokio::test]
    async fn test_zero_inputs_rejected() {
        let est = estimator(dec!(0.5));
        assert!(matches!(
            est.estimate(0, 200).await,
            Err(RelayError::InvalidInput(_))
        ));
        assert!(matches!(
            est.estimate(1024, 0).await,
            Err(RelayError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_oracle_failure_surfaces_as_price_unavailable() {
        let est = CostEstimator::new(StorageCostModel::default(), Arc::new(DownOracle));
        assert!(matches!(
            est.estimate(1024, 200).await,
            Err(RelayError::PriceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_rate_rejected() {
        let est = estimator(Decimal::ZERO);
        assert!(matches!(
            est.estimate(1024, 200).await,
            Err(RelayError::PriceUnavailable(_))
        ));
    }
}
