//! Burn-and-mint bridge client for moving the stablecoin cross-chain.
//!
//! - Submit `depositForBurn` on the source chain's TokenMessenger
//! - Poll the attestation service for the signed message
//! - Submit `receiveMessage` on the destination chain's MessageTransmitter

pub mod attestation;
pub mod calldata;
pub mod rpc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha3::{Digest, Keccak256};
use tracing::info;

use attestation::AttestationClient;
use blobpay_types::{bytes_to_hex, hex_to_bytes, Hex, RelayError, Result};
use rpc::{ChainRpcClient, TransactionCall, TransactionReceipt};

/// Result of a successful burn submission.
#[derive(Debug, Clone)]
pub struct BurnReceipt {
    pub source_tx_hash: Hex,
    /// Raw `MessageSent` payload emitted by the burn.
    pub message: Vec<u8>,
}

/// Burn-and-mint transfer in three independently awaitable sub-steps.
///
/// `initiate_burn` must never be invoked twice for one logical request;
/// callers treat the absence of a source tx hash as the only safe retry
/// boundary.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Submit the burn on the source chain; returns once the transaction
    /// is accepted into a block. A revert is terminal (`BurnRejected`).
    async fn initiate_burn(
        &self,
        amount: Decimal,
        source_account: &str,
        destination_recipient: &str,
    ) -> Result<BurnReceipt>;

    /// Poll the attestation service until an attestation is produced.
    /// `AttestationTimeout` after the configured overall timeout;
    /// recoverable by re-polling, never by re-burning.
    async fn await_attestation(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Submit the mint on the destination chain using the attestation.
    /// A revert is terminal (`MintRejected`).
    async fn mint_on_destination(&self, message: &[u8], attestation: &[u8]) -> Result<Hex>;
}

/// Bridge contract addresses and poll policy.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub stablecoin_address: Hex,
    pub token_messenger_address: Hex,
    pub message_transmitter_address: Hex,
    /// Account the relayer mints from on the destination chain.
    pub destination_relayer_account: Hex,
    pub destination_domain: u32,
    pub stablecoin_decimals: u32,
    pub receipt_poll_attempts: u32,
    pub receipt_poll_interval_ms: u64,
    pub attestation_poll_interval_ms: u64,
    pub attestation_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            stablecoin_address: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".into(),
            token_messenger_address: "0x19330d10D9Cc8751218eaf51E8885D058642E08A".into(),
            message_transmitter_address: "0xC30362313FBBA5cf9163F0bb16a0e01f01A896ca".into(),
            destination_relayer_account: "0x0".into(),
            destination_domain: 8,
            stablecoin_decimals: 6,
            receipt_poll_attempts: 30,
            receipt_poll_interval_ms: 2_000,
            attestation_poll_interval_ms: 5_000,
            attestation_timeout_ms: 600_000,
        }
    }
}

/// CCTP-style bridge client over two chain RPC endpoints and the
/// attestation service.
pub struct CctpBridgeClient {
    source: ChainRpcClient,
    destination: ChainRpcClient,
    attestations: AttestationClient,
    config: BridgeConfig,
}

impl CctpBridgeClient {
    pub fn new(
        source: ChainRpcClient,
        destination: ChainRpcClient,
        attestations: AttestationClient,
        config: BridgeConfig,
    ) -> Self {
        Self {
            source,
            destination,
            attestations,
            config,
        }
    }

    /// Scale a decimal amount into stablecoin base units, rounding up so
    /// the slippage buffer is never eroded by truncation.
    fn to_base_units(&self, amount: Decimal) -> Result<u128> {
        if amount <= Decimal::ZERO {
            return Err(RelayError::InvalidInput(format!(
                "bridge amount must be positive, got {}",
                amount
            )));
        }
        let scale = Decimal::from(10u64.pow(self.config.stablecoin_decimals));
        (amount * scale)
            .ceil()
            .to_u128()
            .ok_or_else(|| RelayError::InvalidInput(format!("amount {} out of range", amount)))
    }
}

#[async_trait]
impl BridgeClient for CctpBridgeClient {
    async fn initiate_burn(
        &self,
        amount: Decimal,
        source_account: &str,
        destination_recipient: &str,
    ) -> Result<BurnReceipt> {
        let amount_units = self.to_base_units(amount)?;
        let recipient = calldata::address_to_bytes32(destination_recipient)?;
        let data = calldata::deposit_for_burn(
            amount_units,
            self.config.destination_domain,
            &recipient,
            &self.config.stablecoin_address,
        )?;

        let call = TransactionCall {
            from: source_account.to_string(),
            to: self.config.token_messenger_address.clone(),
            data,
            value: None,
        };
        let tx_hash = self
            .source
            .send_transaction(&call)
            .await
            .map_err(|e| RelayError::BurnRejected(e.to_string()))?;

        let receipt = self
            .source
            .wait_for_receipt(
                &tx_hash,
                self.config.receipt_poll_attempts,
                self.config.receipt_poll_interval_ms,
            )
            .await
            .map_err(|e| RelayError::BurnRejected(e.to_string()))?;
        if !receipt.is_success() {
            return Err(RelayError::BurnRejected(format!(
                "burn transaction {} reverted",
                tx_hash
            )));
        }

        let message = extract_message_sent(&receipt)?;
        info!(tx = %tx_hash, burned_units = amount_units, "burn confirmed on source chain");
        Ok(BurnReceipt {
            source_tx_hash: tx_hash,
            message,
        })
    }

    async fn await_attestation(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.attestations
            .wait_for_attestation(
                message,
                self.config.attestation_poll_interval_ms,
                self.config.attestation_timeout_ms,
            )
            .await
    }

    async fn mint_on_destination(&self, message: &[u8], attestation: &[u8]) -> Result<Hex> {
        let call = TransactionCall {
            from: self.config.destination_relayer_account.clone(),
            to: self.config.message_transmitter_address.clone(),
            data: calldata::receive_message(message, attestation),
            value: None,
        };
        let tx_hash = self
            .destination
            .send_transaction(&call)
            .await
            .map_err(|e| RelayError::MintRejected(e.to_string()))?;

        let receipt = self
            .destination
            .wait_for_receipt(
                &tx_hash,
                self.config.receipt_poll_attempts,
                self.config.receipt_poll_interval_ms,
            )
            .await
            .map_err(|e| RelayError::MintRejected(e.to_string()))?;
        if !receipt.is_success() {
            return Err(RelayError::MintRejected(format!(
                "mint transaction {} reverted",
                tx_hash
            )));
        }

        info!(tx = %tx_hash, "mint confirmed on destination chain");
        Ok(tx_hash)
    }
}

/// Find the `MessageSent(bytes)` log in a burn receipt and decode its
/// payload.
fn extract_message_sent(receipt: &TransactionReceipt) -> Result<Vec<u8>> {
    let topic = bytes_to_hex(&Keccak256::digest(b"MessageSent(bytes)"));
    for log in &receipt.logs {
        let matches_topic = log
            .topics
            .first()
            .map(|t| t.eq_ignore_ascii_case(&topic))
            .unwrap_or(false);
        if matches_topic {
            let raw = hex_to_bytes(&log.data)?;
            return calldata::decode_single_bytes(&raw);
        }
    }
    Err(RelayError::BurnRejected(
        "MessageSent event not found in transaction logs".into(),
    ))
}
