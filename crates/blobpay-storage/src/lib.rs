//! HTTP client for the blob storage network (publisher + aggregator).
//!
//! Endpoints:
//! - PUT {publisher}/v1/store?epochs=N   (multipart upload)
//! - GET {aggregator}/v1/{blob_id}
//! - GET {aggregator}/v1/info/{blob_id}

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use blobpay_types::{ByteStream, Payload, PayloadKind, RelayError, Result, StoredBlob};

/// Upload/retrieve contract against the storage network. `retrieve` and
/// `info` are read-only and idempotent.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Upload a payload for `retention_epochs` epochs. A streamed payload
    /// is sent without buffering it in memory.
    async fn store(
        &self,
        payload: Payload,
        payload_kind: PayloadKind,
        retention_epochs: u64,
    ) -> Result<StoredBlob>;

    async fn retrieve(&self, blob_id: &str) -> Result<ByteStream>;

    async fn info(&self, blob_id: &str) -> Result<StoredBlob>;
}

// --- Publisher wire format ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub newly_created: Option<NewlyCreated>,
    pub already_certified: Option<AlreadyCertified>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewlyCreated {
    pub blob_object: BlobObject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    pub blob_id: String,
    pub size: u64,
    pub certified_epoch: Option<u64>,
    pub storage: StorageResource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageResource {
    pub start_epoch: u64,
    pub end_epoch: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlreadyCertified {
    pub blob_id: String,
    pub end_epoch: u64,
}

impl StoreResponse {
    /// Exactly one of the two arms must be present.
    pub fn into_stored_blob(self, uploaded_size: u64) -> Result<StoredBlob> {
        match (self.newly_created, self.already_certified) {
            (Some(created), None) => Ok(StoredBlob {
                blob_id: created.blob_object.blob_id,
                size_bytes: created.blob_object.size,
                storage_start_epoch: created.blob_object.storage.start_epoch,
                storage_end_epoch: created.blob_object.storage.end_epoch,
                certified: created.blob_object.certified_epoch.is_some(),
            }),
            (None, Some(existing)) => Ok(StoredBlob {
                blob_id: existing.blob_id,
                size_bytes: uploaded_size,
                // the publisher does not report the original start epoch
                // for an already-certified blob
                storage_start_epoch: 0,
                storage_end_epoch: existing.end_epoch,
                certified: true,
            }),
            _ => Err(RelayError::Other(
                "store response must carry exactly one of newlyCreated or alreadyCertified".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobInfoResponse {
    blob_id: String,
    size: u64,
    start_epoch: u64,
    end_epoch: u64,
    certified: bool,
}

/// Retry policy for transient storage failures.
#[derive(Debug, Clone)]
pub struct StorageRetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for StorageRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl StorageRetryPolicy {
    /// Delay before the given retry (1-based), doubling and capped.
    pub fn delay_ms(&self, retry: u32) -> u64 {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }
}

/// Storage client against a Walrus-style publisher/aggregator pair.
pub struct WalrusStorageClient {
    publisher_url: String,
    aggregator_url: String,
    client: reqwest::Client,
    read_timeout: Duration,
    upload_timeout: Duration,
    retry: StorageRetryPolicy,
}

impl WalrusStorageClient {
    pub fn new(
        publisher_url: &str,
        aggregator_url: &str,
        retry: StorageRetryPolicy,
        upload_timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            publisher_url: publisher_url.trim_end_matches('/').to_string(),
            aggregator_url: aggregator_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            read_timeout: Duration::from_millis(20_000),
            upload_timeout: Duration::from_millis(upload_timeout_ms.unwrap_or(120_000)),
            retry,
        }
    }

    async fn store_once(
        &self,
        body: reqwest::Body,
        content_type: &'static str,
        size_bytes: u64,
        retention_epochs: u64,
    ) -> Result<StoredBlob> {
        let part = reqwest::multipart::Part::stream_with_length(body, size_bytes)
            .file_name("blob")
            .mime_str(content_type)
            .map_err(|e| RelayError::InvalidInput(format!("invalid content type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!(
            "{}/v1/store?epochs={}",
            self.publisher_url, retention_epochs
        );
        let resp = self
            .client
            .put(&url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| RelayError::StorageUnavailable(format!("store request failed: {}", e)))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(RelayError::StorageUnavailable(format!(
                "publisher returned status {}",
                status
            )));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::StorageRejected(format!(
                "publisher returned status {}: {}",
                status, text
            )));
        }

        let body: StoreResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Other(format!("failed to parse store response: {}", e)))?;
        body.into_stored_blob(size_bytes)
    }
}

#[async_trait]
impl StorageClient for WalrusStorageClient {
    async fn store(
        &self,
        payload: Payload,
        payload_kind: PayloadKind,
        retention_epochs: u64,
    ) -> Result<StoredBlob> {
        if retention_epochs == 0 {
            return Err(RelayError::InvalidInput(
                "retention epochs must be positive".into(),
            ));
        }
        let size_bytes = payload.size_bytes();
        if size_bytes == 0 {
            return Err(RelayError::InvalidInput("payload is empty".into()));
        }
        let content_type = payload_kind.content_type();

        match payload {
            Payload::Bytes(bytes) => {
                let mut attempt = 1u32;
                loop {
                    let outcome = self
                        .store_once(bytes.clone().into(), content_type, size_bytes, retention_epochs)
                        .await;
                    match outcome {
                        Ok(blob) => {
                            info!(blob_id = %blob.blob_id, size_bytes, "blob stored");
                            return Ok(blob);
                        }
                        Err(err @ RelayError::StorageUnavailable(_))
                            if attempt < self.retry.max_attempts =>
                        {
                            let delay = self.retry.delay_ms(attempt);
                            warn!(attempt, delay_ms = delay, "transient storage failure: {}", err);
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            attempt += 1;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            Payload::Stream { stream, .. } => {
                // a stream cannot be replayed, so it gets a single attempt
                self.store_once(
                    reqwest::Body::wrap_stream(stream),
                    content_type,
                    size_bytes,
                    retention_epochs,
                )
                .await
            }
        }
    }

    async fn retrieve(&self, blob_id: &str) -> Result<ByteStream> {
        let url = format!("{}/v1/{}", self.aggregator_url, blob_id);
        let resp = self
            .client
            .get(&url)
            .timeout(self.read_timeout)
            .send()
            .await
            .map_err(|e| RelayError::StorageUnavailable(format!("retrieve request failed: {}", e)))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(RelayError::StorageUnavailable(format!(
                "aggregator returned status {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(RelayError::StorageRejected(format!(
                "aggregator returned status {} for blob {}",
                status, blob_id
            )));
        }

        Ok(resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed())
    }

    async fn info(&self, blob_id: &str) -> Result<StoredBlob> {
        let url = format!("{}/v1/info/{}", self.aggregator_url, blob_id);
        let resp = self
            .client
            .get(&url)
            .timeout(self.read_timeout)
            .send()
            .await
            .map_err(|e| RelayError::StorageUnavailable(format!("info request failed: {}", e)))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(RelayError::StorageUnavailable(format!(
                "aggregator returned status {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(RelayError::StorageRejected(format!(
                "aggregator returned status {} for blob {}",
                status, blob_id
            )));
        }

        let meta: BlobInfoResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Other(format!("failed to parse blob info: {}", e)))?;
        Ok(StoredBlob {
            blob_id: meta.blob_id,
            size_bytes: meta.size,
            storage_start_epoch: meta.start_epoch,
            storage_end_epoch: meta.end_epoch,
            certified: meta.certified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newly_created_response_parses() {
        let raw = r#"{
            "newlyCreated": {
                "blobObject": {
                    "blobId": "abc123",
                    "size": 1024,
                    "certifiedEpoch": 42,
                    "storage": {"startEpoch": 40, "endEpoch": 240}
                }
            }
        }"#;
        let resp: StoreResponse = serde_json::from_str(raw).unwrap();
        let blob = resp.into_stored_blob(1024).unwrap();
        assert_eq!(blob.blob_id, "abc123");
        assert_eq!(blob.size_bytes, 1024);
        assert_eq!(blob.storage_start_epoch, 40);
        assert_eq!(blob.storage_end_epoch, 240);
        assert!(blob.certified);
    }

    #[test]
    fn test_uncertified_newly_created() {
        let raw = r#"{
            "newlyCreated": {
                "blobObject": {
                    "blobId": "abc123",
                    "size": 64,
                    "certifiedEpoch": null,
                    "storage": {"startEpoch": 40, "endEpoch": 240}
                }
            }
        }"#;
        let resp: StoreResponse = serde_json::from_str(raw).unwrap();
        assert!(!resp.into_stored_blob(64).unwrap().certified);
    }

    #[test]
    fn test_already_certified_response_parses() {
        let raw = r#"{
            "alreadyCertified": {
                "blobId": "xyz789",
                "event": {"txDigest": "0xd1", "eventSeq": "0"},
                "endEpoch": 300
            }
        }"#;
        let resp: StoreResponse = serde_json::from_str(raw).unwrap();
        let blob = resp.into_stored_blob(2048).unwrap();
        assert_eq!(blob.blob_id, "xyz789");
        assert_eq!(blob.size_bytes, 2048);
        assert_eq!(blob.storage_end_epoch, 300);
        assert!(blob.certified);
    }

    #[test]
    fn test_exactly_one_arm_required() {
        let neither: StoreResponse = serde_json::from_str("{}").unwrap();
        assert!(neither.into_stored_blob(1).is_err());

        let both: StoreResponse = serde_json::from_str(
            r#"{
                "newlyCreated": {
                    "blobObject": {
                        "blobId": "a", "size": 1, "certifiedEpoch": null,
                        "storage": {"startEpoch": 0, "endEpoch": 1}
                    }
                },
                "alreadyCertified": {"blobId": "b", "endEpoch": 1}
            }"#,
        )
        .unwrap();
        assert!(both.into_stored_blob(1).is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = StorageRetryPolicy::default();
        assert_eq!(policy.delay_ms(1), 500);
        assert_eq!(policy.delay_ms(2), 1_000);
        assert_eq!(policy.delay_ms(3), 2_000);
        assert_eq!(policy.delay_ms(10), 8_000);
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let client = WalrusStorageClient::new(
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
            StorageRetryPolicy::default(),
            None,
        );
        let err = client
            .store(Payload::Bytes(Vec::new()), PayloadKind::File, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));

        let err = client
            .store(Payload::from_text("hi"), PayloadKind::Text, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
    }
}
