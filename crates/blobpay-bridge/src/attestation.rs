//! Client for the cross-chain attestation service.
//!
//! Endpoints:
//! - GET /v1/attestations/<0x-message-hash>

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::time::Duration;
use tracing::warn;

use blobpay_types::{bytes_to_hex, hex_to_bytes, Hex, RelayError, Result};

/// Attestation endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationResponse {
    /// "pending_confirmations" until signed, then "complete".
    pub status: String,
    #[serde(default)]
    pub attestation: Option<Hex>,
}

/// Attestation service client keyed by the hash of the burn message.
pub struct AttestationClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl AttestationClient {
    pub fn new(base_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(10_000);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Keccak-256 of the raw `MessageSent` payload, as the service keys it.
    pub fn message_hash(message: &[u8]) -> Hex {
        bytes_to_hex(&Keccak256::digest(message))
    }

    /// Fetch the attestation once. `Ok(None)` while not yet produced.
    pub async fn fetch(&self, message_hash: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/v1/attestations/{}", self.base_url, message_hash);

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Other(format!("attestation request failed: {}", e)))?;

        // the service 404s until the burn message is indexed
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(RelayError::Other(format!(
                "attestation service returned status {}",
                resp.status()
            )));
        }

        let body: AttestationResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Other(format!("failed to parse attestation response: {}", e)))?;

        if body.status != "complete" {
            return Ok(None);
        }
        let attestation = body
            .attestation
            .ok_or_else(|| RelayError::Other("complete attestation is missing its payload".into()))?;
        Ok(Some(hex_to_bytes(&attestation)?))
    }

    /// Poll at a fixed interval until the attestation is complete or the
    /// overall timeout elapses. Transient fetch failures do not abort the
    /// poll; they consume the interval like a pending response.
    pub async fn wait_for_attestation(
        &self,
        message: &[u8],
        poll_interval_ms: u64,
        timeout_ms: u64,
    ) -> Result<Vec<u8>> {
        let hash = Self::message_hash(message);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            match self.fetch(&hash).await {
                Ok(Some(attestation)) => return Ok(attestation),
                Ok(None) => {}
                Err(e) => warn!(message_hash = %hash, "attestation fetch failed: {}", e),
            }
            if tokio::time::Instant::now() + Duration::from_millis(poll_interval_ms) > deadline {
                return Err(RelayError::AttestationTimeout {
                    waited_ms: timeout_ms,
                });
            }
            tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_hash_is_keccak() {
        // keccak256 of the empty input
        assert_eq!(
            AttestationClient::message_hash(&[]),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_attestation_response_decoding() {
        let pending: AttestationResponse =
            serde_json::from_str(r#"{"status": "pending_confirmations"}"#).unwrap();
        assert_eq!(pending.status, "pending_confirmations");
        assert!(pending.attestation.is_none());

        let complete: AttestationResponse =
            serde_json::from_str(r#"{"status": "complete", "attestation": "0xdeadbeef"}"#)
                .unwrap();
        assert_eq!(complete.status, "complete");
        assert_eq!(complete.attestation.as_deref(), Some("0xdeadbeef"));
    }

    #[tokio::test]
    async fn test_wait_for_attestation_times_out() {
        // unreachable endpoint: every fetch fails, the poll keeps going
        // until the overall deadline
        let client = AttestationClient::new("http://127.0.0.1:1", Some(50));
        let err = client
            .wait_for_attestation(&[1, 2, 3], 50, 150)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::AttestationTimeout { waited_ms: 150 }));
    }
}
