use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::record::{NewSubmission, RecordId, RecordPatch};
use crate::error::ServiceResult;

/// Record half of the remote service
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create_record(&self, new: &NewSubmission) -> ServiceResult<RecordId>;

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> ServiceResult<()>;
}

/// Read side used by the review feed
#[async_trait]
pub trait SubmissionReader: Send + Sync {
    /// Raw stored rows, newest first
    async fn list_records(&self) -> ServiceResult<Vec<Value>>;
}

/// Object storage half of the remote service
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ServiceResult<()>;

    /// `None` when the bucket has no public access
    async fn resolve_public_url(&self, bucket: &str, key: &str) -> Option<String>;

    async fn create_signed_url(&self, bucket: &str, key: &str, ttl: Duration)
        -> ServiceResult<String>;
}

/// Public URL if there is one, otherwise a long-lived signed URL
pub async fn resolve_durable_url(
    storage: &dyn MediaStorage,
    bucket: &str,
    key: &str,
    ttl: Duration,
) -> ServiceResult<String> {
    if let Some(url) = storage.resolve_public_url(bucket, key).await {
        return Ok(url);
    }

    debug!("No public URL for {}/{}, signing for {:?}", bucket, key, ttl);
    storage.create_signed_url(bucket, key, ttl).await
}
