//! Relayer orchestration: cost -> bridge -> swap -> store.
//!
//! One orchestrator run serves exactly one storage request. Each phase
//! performs exactly one external operation; completed phases are exposed
//! to pollers as a monotonic progress snapshot, and the first failure
//! terminates the run without undoing completed on-chain operations.

pub mod progress;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use blobpay_bridge::{
    attestation::AttestationClient, rpc::ChainRpcClient, BridgeClient, BridgeConfig,
    CctpBridgeClient,
};
use blobpay_quote::{
    price::{DexPriceOracle, PriceOracle},
    CostEstimator, StorageCostModel,
};
use blobpay_storage::{StorageClient, StorageRetryPolicy, WalrusStorageClient};
use blobpay_swap::{DexSwapClient, SwapClient};
use blobpay_types::{
    rounded_6dp, BridgeStatus, BridgeTransfer, CostQuote, ErrorReport, RelayError, RelayerProgress,
    RelayerResult, Result, StorageRequest, SwapResult,
};
use progress::{ProgressCell, RelayPhase};

/// Process-wide relayer policy; read-only after startup.
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    /// Extra attestation poll rounds after the first timeout. The burn
    /// is never repeated, only the poll.
    pub attestation_repoll_rounds: u32,
    /// Fresh quotes taken after a `SlippageExceeded` rejection.
    pub swap_requote_attempts: u32,
    /// Flat per-request gas estimate reported in the cost summary.
    pub gas_fee_estimate: Decimal,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            attestation_repoll_rounds: 1,
            swap_requote_attempts: 2,
            gas_fee_estimate: Decimal::new(1, 3),
        }
    }
}

/// Environment endpoints and contract addresses.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub source_rpc_url: String,
    pub destination_rpc_url: String,
    pub attestation_base_url: String,
    pub dex_base_url: String,
    pub publisher_url: String,
    pub aggregator_url: String,
    pub stable_symbol: String,
    pub token_symbol: String,
    pub bridge: BridgeConfig,
}

/// The state machine sequencing CostEstimator -> BridgeClient ->
/// SwapClient -> StorageClient for one request at a time.
pub struct RelayerOrchestrator {
    estimator: CostEstimator,
    bridge: Arc<dyn BridgeClient>,
    swap: Arc<dyn SwapClient>,
    storage: Arc<dyn StorageClient>,
    config: RelayerConfig,
    cell: ProgressCell,
    running: AtomicBool,
}

impl RelayerOrchestrator {
    pub fn new(
        estimator: CostEstimator,
        bridge: Arc<dyn BridgeClient>,
        swap: Arc<dyn SwapClient>,
        storage: Arc<dyn StorageClient>,
        config: RelayerConfig,
    ) -> Self {
        Self {
            estimator,
            bridge,
            swap,
            storage,
            config,
            cell: ProgressCell::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Wire concrete HTTP clients from environment endpoints.
    pub fn from_network(
        network: &NetworkConfig,
        cost_model: StorageCostModel,
        config: RelayerConfig,
    ) -> Self {
        let oracle: Arc<dyn PriceOracle> = Arc::new(DexPriceOracle::new(
            &network.dex_base_url,
            &network.stable_symbol,
            &network.token_symbol,
            None,
        ));
        let estimator = CostEstimator::new(cost_model, oracle.clone());
        let bridge = Arc::new(CctpBridgeClient::new(
            ChainRpcClient::new(&network.source_rpc_url, None),
            ChainRpcClient::new(&network.destination_rpc_url, None),
            AttestationClient::new(&network.attestation_base_url, None),
            network.bridge.clone(),
        ));
        let swap = Arc::new(DexSwapClient::new(
            &network.dex_base_url,
            oracle,
            &network.stable_symbol,
            &network.token_symbol,
            None,
        ));
        let storage = Arc::new(WalrusStorageClient::new(
            &network.publisher_url,
            &network.aggregator_url,
            StorageRetryPolicy::default(),
            None,
        ));
        Self::new(estimator, bridge, swap, storage, config)
    }

    /// Snapshot copy of the current progress, never a live reference.
    pub fn progress(&self) -> RelayerProgress {
        self.cell.snapshot()
    }

    /// Return progress to all-false/Idle regardless of prior outcome.
    pub fn reset_progress(&self) {
        self.cell.reset();
    }

    /// Cancel the in-flight run. Accepted only while the burn has not
    /// been broadcast; afterwards the request must reach a terminal
    /// outcome on its own.
    pub fn cancel(&self) -> Result<()> {
        if self.cell.request_cancel() {
            Ok(())
        } else {
            Err(RelayError::Other(
                "burn already broadcast; request is in flight and must run to completion".into(),
            ))
        }
    }

    /// Drive one storage request to a terminal result.
    pub async fn submit_storage_request(&self, request: StorageRequest) -> RelayerResult {
        if self.running.swap(true, Ordering::AcqRel) {
            let err = RelayError::InvalidInput("another request is already running".into());
            return RelayerResult {
                error: Some(ErrorReport::from(&err)),
                ..RelayerResult::default()
            };
        }

        self.cell.begin();
        let mut result = RelayerResult::default();
        match self.drive(request, &mut result).await {
            Ok(()) => {
                result.success = true;
                info!(blob_id = ?result.blob_id, "storage request completed");
            }
            Err(err) => {
                self.cell.fail();
                warn!("storage request failed: {}", err);
                result.error = Some(ErrorReport::from(&err));
            }
        }
        result.cost.stablecoin_amount = rounded_6dp(result.cost.stablecoin_amount);
        result.cost.token_amount = rounded_6dp(result.cost.token_amount);
        result.cost.gas_fees = rounded_6dp(result.cost.gas_fees);

        self.running.store(false, Ordering::Release);
        result
    }

    async fn drive(&self, request: StorageRequest, result: &mut RelayerResult) -> Result<()> {
        let StorageRequest {
            payload,
            payload_kind,
            source_address,
            destination_address,
            retention_epochs,
        } = request;

        // Phase 1: quote
        let byte_size = payload.size_bytes();
        info!(byte_size, retention_epochs, "calculating storage cost");
        let quote = self.estimator.estimate(byte_size, retention_epochs).await?;
        result.cost.stablecoin_amount = quote.stablecoin_amount;
        result.cost.token_amount = quote.token_amount;
        result.cost.gas_fees = self.config.gas_fee_estimate;
        self.cell.advance(RelayPhase::CostCalculated);

        // Phase 2: burn-and-mint bridge transfer
        info!(amount = %quote.stablecoin_amount, "transferring stablecoin cross-chain");
        let mut transfer = BridgeTransfer::new(quote.stablecoin_amount);
        let bridged = self
            .bridge_phase(&mut transfer, &source_address, &destination_address)
            .await;
        result.bridge_tx_hash = transfer.source_tx_hash.clone();
        bridged?;
        self.cell.advance(RelayPhase::BridgeCompleted);

        // Phase 3: swap, re-quoted on slippage
        info!(input = %quote.stablecoin_amount, "swapping to storage token");
        let swap = self
            .swap_phase(&quote, byte_size, retention_epochs, &destination_address, result)
            .await?;
        result.swap_tx_digest = Some(swap.destination_tx_digest.clone());
        self.cell.advance(RelayPhase::SwapCompleted);

        // Phase 4: store
        info!(byte_size, "storing payload");
        let blob = self
            .storage
            .store(payload, payload_kind, retention_epochs)
            .await?;
        result.blob_id = Some(blob.blob_id);
        self.cell.advance(RelayPhase::StorageCompleted);
        Ok(())
    }

    /// Burn exactly once, then poll for the attestation (re-polling per
    /// config, never re-burning) and mint. The absence of a source tx
    /// hash is the only safe retry boundary.
    async fn bridge_phase(
        &self,
        transfer: &mut BridgeTransfer,
        source_account: &str,
        destination_recipient: &str,
    ) -> Result<()> {
        if transfer.source_tx_hash.is_none() {
            if !self.cell.try_mark_burn_broadcast() {
                return Err(RelayError::Cancelled);
            }
            let receipt = match self
                .bridge
                .initiate_burn(transfer.amount, source_account, destination_recipient)
                .await
            {
                Ok(receipt) => receipt,
                Err(err) => {
                    transfer.status = BridgeStatus::Failed;
                    return Err(err);
                }
            };
            transfer.source_tx_hash = Some(receipt.source_tx_hash);
            transfer.attestation_message = Some(receipt.message);
            transfer.status = BridgeStatus::Burned;
        }

        let message = transfer
            .attestation_message
            .clone()
            .ok_or_else(|| RelayError::Other("burned transfer is missing its message".into()))?;

        let mut rounds = 0u32;
        let attestation = loop {
            match self.bridge.await_attestation(&message).await {
                Ok(attestation) => break attestation,
                Err(RelayError::AttestationTimeout { waited_ms })
                    if rounds < self.config.attestation_repoll_rounds =>
                {
                    rounds += 1;
                    warn!(rounds, "attestation poll timed out after {} ms; re-polling", waited_ms);
                }
                // a timed-out or failed poll leaves the transfer Burned:
                // the burn is final and must not be repeated
                Err(err) => return Err(err),
            }
        };
        transfer.status = BridgeStatus::AttestationReceived;

        match self.bridge.mint_on_destination(&message, &attestation).await {
            Ok(tx_hash) => {
                transfer.destination_mint_tx_hash = Some(tx_hash);
                transfer.status = BridgeStatus::Minted;
                Ok(())
            }
            Err(err) => {
                transfer.status = BridgeStatus::Failed;
                Err(err)
            }
        }
    }

    /// The swap input is pinned to the bridged stablecoin amount; a
    /// slippage rejection triggers a fresh quote, which refreshes the
    /// minimum-output floor rather than resubmitting the stale one.
    async fn swap_phase(
        &self,
        original: &CostQuote,
        byte_size: u64,
        retention_epochs: u64,
        account: &str,
        result: &mut RelayerResult,
    ) -> Result<SwapResult> {
        let input_amount = original.stablecoin_amount;
        let mut quote = original.clone();
        let mut attempt = 0u32;
        loop {
            match self
                .swap
                .swap(input_amount, quote.min_swap_output(), account)
                .await
            {
                Ok(swap) => return Ok(swap),
                Err(RelayError::SlippageExceeded {
                    min_output,
                    realized_output,
                }) if attempt < self.config.swap_requote_attempts => {
                    attempt += 1;
                    warn!(
                        attempt,
                        %min_output,
                        %realized_output,
                        "swap slippage exceeded; taking a fresh quote"
                    );
                    quote = self.estimator.estimate(byte_size, retention_epochs).await?;
                    result.cost.token_amount = quote.token_amount;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
