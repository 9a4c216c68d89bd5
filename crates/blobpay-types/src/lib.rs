//! Shared types for the blobpay relayer.
//!
//! - Error taxonomy and `Result` alias
//! - Request, quote, transfer, swap, and terminal-result records
//! - Payload variants (in-memory bytes or a byte stream)
//! - Hex and display-rounding helpers

use bytes::Bytes;
use futures::stream::BoxStream;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 0x-prefixed hex string (e.g. "0x1234...").
pub type Hex = String;

/// Relayer error taxonomy.
///
/// Terminal variants (`BurnRejected`, `MintRejected`, `StorageRejected`)
/// reflect on-chain or server-side finality and are never retried.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("price oracle unavailable: {0}")]
    PriceUnavailable(String),

    #[error("no swap route available: {0}")]
    LiquidityUnavailable(String),

    #[error("burn transaction rejected: {0}")]
    BurnRejected(String),

    #[error("mint transaction rejected: {0}")]
    MintRejected(String),

    #[error("storage request rejected: {0}")]
    StorageRejected(String),

    #[error("attestation not produced within {waited_ms} ms")]
    AttestationTimeout { waited_ms: u64 },

    #[error("swap output {realized_output} below minimum {min_output}")]
    SlippageExceeded {
        min_output: Decimal,
        realized_output: Decimal,
    },

    #[error("storage network unavailable: {0}")]
    StorageUnavailable(String),

    #[error("request cancelled before execution")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::InvalidInput(_) => ErrorKind::InvalidInput,
            RelayError::PriceUnavailable(_) => ErrorKind::PriceUnavailable,
            RelayError::LiquidityUnavailable(_) => ErrorKind::LiquidityUnavailable,
            RelayError::BurnRejected(_) => ErrorKind::BurnRejected,
            RelayError::MintRejected(_) => ErrorKind::MintRejected,
            RelayError::StorageRejected(_) => ErrorKind::StorageRejected,
            RelayError::AttestationTimeout { .. } => ErrorKind::AttestationTimeout,
            RelayError::SlippageExceeded { .. } => ErrorKind::SlippageExceeded,
            RelayError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            RelayError::Cancelled => ErrorKind::Cancelled,
            RelayError::Other(_) => ErrorKind::Other,
        }
    }

    /// Transient failures the orchestrator may retry without caller input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::PriceUnavailable(_)
                | RelayError::LiquidityUnavailable(_)
                | RelayError::AttestationTimeout { .. }
                | RelayError::SlippageExceeded { .. }
                | RelayError::StorageUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Serializable error classification mirroring [`RelayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    PriceUnavailable,
    LiquidityUnavailable,
    BurnRejected,
    MintRejected,
    StorageRejected,
    AttestationTimeout,
    SlippageExceeded,
    StorageUnavailable,
    Cancelled,
    Other,
}

/// Terminal error record carried in a [`RelayerResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&RelayError> for ErrorReport {
    fn from(err: &RelayError) -> Self {
        Self {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// Content classification for a payload. Affects only the content-type
/// tag sent to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Text,
    Image,
    File,
}

impl PayloadKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadKind::Text => "text/plain",
            PayloadKind::Image | PayloadKind::File => "application/octet-stream",
        }
    }
}

/// A stream of payload chunks.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A payload to be stored: bounded in-memory bytes or a stream whose
/// total size is known up front (the size feeds the cost quote).
pub enum Payload {
    Bytes(Vec<u8>),
    Stream { size_bytes: u64, stream: ByteStream },
}

impl Payload {
    pub fn from_text(text: &str) -> Self {
        Payload::Bytes(text.as_bytes().to_vec())
    }

    pub fn size_bytes(&self) -> u64 {
        match self {
            Payload::Bytes(bytes) => bytes.len() as u64,
            Payload::Stream { size_bytes, .. } => *size_bytes,
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Bytes(bytes) => f.debug_struct("Bytes").field("len", &bytes.len()).finish(),
            Payload::Stream { size_bytes, .. } => f
                .debug_struct("Stream")
                .field("size_bytes", size_bytes)
                .finish(),
        }
    }
}

/// A caller-submitted storage request. Immutable once submitted;
/// consumed exactly once by the orchestrator.
#[derive(Debug)]
pub struct StorageRequest {
    pub payload: Payload,
    pub payload_kind: PayloadKind,
    pub source_address: Hex,
    pub destination_address: Hex,
    pub retention_epochs: u64,
}

/// A user-facing cost quote. Recomputed on demand, never cached: the
/// exchange rate and storage price may drift between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostQuote {
    pub byte_size: u64,
    pub token_amount: Decimal,
    pub stablecoin_amount: Decimal,
    pub slippage_buffer_pct: Decimal,
}

impl CostQuote {
    /// Minimum acceptable swap output. The slippage buffer is already on
    /// the stablecoin (input) side, so the floor is the unbuffered token
    /// requirement from the same quote.
    pub fn min_swap_output(&self) -> Decimal {
        self.token_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeStatus {
    Initiated,
    Burned,
    AttestationReceived,
    Minted,
    Failed,
}

/// One burn-and-mint transfer. Owned by the orchestrator for the
/// lifetime of a single request; never shared across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeTransfer {
    pub amount: Decimal,
    pub source_tx_hash: Option<Hex>,
    /// Opaque `MessageSent` payload; the attestation service is keyed
    /// by its hash.
    pub attestation_message: Option<Vec<u8>>,
    pub destination_mint_tx_hash: Option<Hex>,
    pub status: BridgeStatus,
}

impl BridgeTransfer {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            source_tx_hash: None,
            attestation_message: None,
            destination_mint_tx_hash: None,
            status: BridgeStatus::Initiated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStatus {
    Pending,
    Executed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    pub input_amount: Decimal,
    pub output_amount: Decimal,
    pub destination_tx_digest: Hex,
    pub status: SwapStatus,
}

/// Reference to a blob persisted on the storage network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub blob_id: String,
    pub size_bytes: u64,
    pub storage_start_epoch: u64,
    pub storage_end_epoch: u64,
    pub certified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Poller-facing progress snapshot. Flags are set true in fixed order
/// (cost, bridge, swap, store) and never regress within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerProgress {
    pub calculate_cost: bool,
    pub transfer_stable: bool,
    pub swap_to_token: bool,
    pub store_data: bool,
    pub status: RelayStatus,
}

impl Default for RelayerProgress {
    fn default() -> Self {
        Self {
            calculate_cost: false,
            transfer_stable: false,
            swap_to_token: false,
            store_data: false,
            status: RelayStatus::Idle,
        }
    }
}

/// Best-known spend figures, populated as phases complete so a failed
/// run still reports what was spent before the failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub stablecoin_amount: Decimal,
    pub token_amount: Decimal,
    pub gas_fees: Decimal,
}

/// Terminal record of one relay run.
///
/// `success == true` implies `blob_id` is present and `error` is absent;
/// `success == false` implies `error` is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayerResult {
    pub success: bool,
    pub blob_id: Option<String>,
    pub bridge_tx_hash: Option<Hex>,
    pub swap_tx_digest: Option<Hex>,
    pub cost: CostSummary,
    pub error: Option<ErrorReport>,
}

/// Round half-up to the 6-digit display precision. Applied only at
/// result boundaries, never mid-calculation.
pub fn rounded_6dp(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a hex string (optionally 0x-prefixed) into bytes.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| RelayError::InvalidInput(format!("invalid hex: {}", e)))
}

/// Convert bytes to a 0x-prefixed hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> Hex {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_kind_mapping() {
        let err = RelayError::AttestationTimeout { waited_ms: 600_000 };
        assert_eq!(err.kind(), ErrorKind::AttestationTimeout);
        assert!(err.is_retryable());

        let err = RelayError::BurnRejected("insufficient balance".into());
        assert_eq!(err.kind(), ErrorKind::BurnRejected);
        assert!(!err.is_retryable());

        let err = RelayError::InvalidInput("empty payload".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_report_carries_kind_and_detail() {
        let err = RelayError::SlippageExceeded {
            min_output: dec!(204.8),
            realized_output: dec!(200.1),
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.kind, ErrorKind::SlippageExceeded);
        assert!(report.detail.contains("204.8"));
        assert!(report.detail.contains("200.1"));
    }

    #[test]
    fn test_rounded_6dp_half_up() {
        assert_eq!(rounded_6dp(dec!(0.0000015)), dec!(0.000002));
        assert_eq!(rounded_6dp(dec!(430.08)), dec!(430.08));
        assert_eq!(rounded_6dp(dec!(1.23456789)), dec!(1.234568));
    }

    #[test]
    fn test_hex_roundtrip() {
        let bytes = vec![0x00, 0x1f, 0xff];
        let hex = bytes_to_hex(&bytes);
        assert_eq!(hex, "0x001fff");
        assert_eq!(hex_to_bytes(&hex).unwrap(), bytes);
        assert!(hex_to_bytes("0xzz").is_err());
    }

    #[test]
    fn test_payload_sizes() {
        assert_eq!(Payload::from_text("hello").size_bytes(), 5);
        assert_eq!(Payload::Bytes(vec![0u8; 1024]).size_bytes(), 1024);
    }

    #[test]
    fn test_min_swap_output_is_unbuffered_token_amount() {
        let quote = CostQuote {
            byte_size: 1024,
            token_amount: dec!(204.8),
            stablecoin_amount: dec!(430.08),
            slippage_buffer_pct: dec!(0.05),
        };
        assert_eq!(quote.min_swap_output(), dec!(204.8));
    }
}
