use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};
use crate::submission::{
    MediaStorage, NewSubmission, RecordId, RecordPatch, SubmissionReader, SubmissionRecord,
    SubmissionStatus, SubmissionStore,
};

const DEFAULT_BASE_URL: &str = "memory://storage";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

enum Row {
    Record(SubmissionRecord),
    Legacy(Value),
}

#[derive(Default)]
struct State {
    /// Insertion order; the feed lists newest first
    rows: Vec<Row>,
    objects: HashMap<(String, String), StoredObject>,
    status_history: HashMap<RecordId, Vec<SubmissionStatus>>,
}

/// Remote service held in process memory
///
/// Backs the demo binary and the tests. Uploads never overwrite an existing
/// object, matching a storage bucket without upsert.
pub struct InMemoryService {
    base_url: String,
    public_urls: AtomicBool,
    failing_creates: AtomicUsize,
    creates: AtomicUsize,
    uploads: AtomicUsize,
    state: Mutex<State>,
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryService {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            public_urls: AtomicBool::new(true),
            failing_creates: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            state: Mutex::new(State::default()),
        }
    }

    /// Buckets behave as private: only signed URLs resolve
    pub fn without_public_urls(self) -> Self {
        self.public_urls.store(false, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` record inserts with a write error
    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Store a row in an older shape, for the review feed
    pub fn insert_legacy_row(&self, row: Value) {
        self.state.lock().rows.push(Row::Legacy(row));
    }

    pub fn record(&self, id: &str) -> Option<SubmissionRecord> {
        self.state.lock().rows.iter().find_map(|row| match row {
            Row::Record(r) if r.id == id => Some(r.clone()),
            _ => None,
        })
    }

    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.state
            .lock()
            .rows
            .iter()
            .filter_map(|row| match row {
                Row::Record(r) => Some(r.clone()),
                Row::Legacy(_) => None,
            })
            .collect()
    }

    /// Every status value a record has held, in order
    pub fn status_history(&self, id: &str) -> Vec<SubmissionStatus> {
        self.state
            .lock()
            .status_history
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state
            .lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Successful and failed inserts
    pub fn create_attempts(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, bucket, key)
    }
}

#[async_trait]
impl SubmissionStore for InMemoryService {
    async fn create_record(&self, new: &NewSubmission) -> ServiceResult<RecordId> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ServiceError::Write("insert rejected".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let record = SubmissionRecord::from_new(id.clone(), new.clone(), Utc::now());

        let mut state = self.state.lock();
        state
            .status_history
            .insert(id.clone(), vec![record.status]);
        state.rows.push(Row::Record(record));

        debug!("Inserted record {}", id);
        Ok(id)
    }

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> ServiceResult<()> {
        let mut state = self.state.lock();

        let status = {
            let record = state
                .rows
                .iter_mut()
                .find_map(|row| match row {
                    Row::Record(r) if r.id == id => Some(r),
                    _ => None,
                })
                .ok_or_else(|| ServiceError::Write(format!("no record {}", id)))?;
            record.apply(patch);
            record.status
        };

        state
            .status_history
            .entry(id.to_string())
            .or_default()
            .push(status);

        debug!("Updated record {}", id);
        Ok(())
    }
}

#[async_trait]
impl SubmissionReader for InMemoryService {
    async fn list_records(&self) -> ServiceResult<Vec<Value>> {
        let state = self.state.lock();
        state
            .rows
            .iter()
            .rev()
            .map(|row| match row {
                Row::Record(r) => {
                    serde_json::to_value(r).map_err(|e| ServiceError::Write(e.to_string()))
                }
                Row::Legacy(v) => Ok(v.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl MediaStorage for InMemoryService {
    async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ServiceResult<()> {
        let mut state = self.state.lock();
        let slot = (bucket.to_string(), key.to_string());
        if state.objects.contains_key(&slot) {
            return Err(ServiceError::Upload(format!(
                "{}/{} already exists",
                bucket, key
            )));
        }

        state.objects.insert(
            slot,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resolve_public_url(&self, bucket: &str, key: &str) -> Option<String> {
        if !self.public_urls.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.public_url(bucket, key))
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> ServiceResult<String> {
        if self.object(bucket, key).is_none() {
            return Err(ServiceError::Url(format!("{}/{} not found", bucket, key)));
        }

        Ok(format!(
            "{}/object/sign/{}/{}?token={}&expires_in={}",
            self.base_url,
            bucket,
            key,
            uuid::Uuid::new_v4().simple(),
            ttl.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::SubjectIdentity;
    use serde_json::json;

    fn subject() -> SubjectIdentity {
        SubjectIdentity {
            id: 9,
            first_name: "Grace".to_string(),
            last_name: None,
            username: None,
            language_code: None,
            is_premium: None,
        }
    }

    #[tokio::test]
    async fn test_upload_never_overwrites() {
        let service = InMemoryService::new();
        service
            .upload_bytes("videos", "public/9_1_0.webm", vec![1], "video/webm")
            .await
            .unwrap();

        let again = service
            .upload_bytes("videos", "public/9_1_0.webm", vec![2], "video/webm")
            .await;
        assert!(matches!(again, Err(ServiceError::Upload(_))));
        assert_eq!(
            service.object("videos", "public/9_1_0.webm").unwrap().bytes,
            vec![1]
        );
    }

    #[tokio::test]
    async fn test_failing_creates_are_counted_down() {
        let service = InMemoryService::new();
        service.fail_next_creates(1);

        let new = NewSubmission::provisional(&subject(), json!({}));
        assert!(service.create_record(&new).await.is_err());
        assert!(service.create_record(&new).await.is_ok());
        assert_eq!(service.create_attempts(), 2);
        assert_eq!(service.records().len(), 1);
    }

    #[tokio::test]
    async fn test_private_bucket_only_signs_existing_objects() {
        let service = InMemoryService::new().without_public_urls();
        assert!(service.resolve_public_url("passports", "k").await.is_none());
        assert!(service
            .create_signed_url("passports", "k", Duration::from_secs(60))
            .await
            .is_err());

        service
            .upload_bytes("passports", "k", vec![0], "image/png")
            .await
            .unwrap();
        let url = service
            .create_signed_url("passports", "k", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.contains("/object/sign/passports/k?token="));
        assert!(url.ends_with("expires_in=60"));
    }

    #[tokio::test]
    async fn test_feed_lists_newest_first() {
        let service = InMemoryService::new();
        service.insert_legacy_row(json!({ "id": "old", "videoUrl": "v" }));
        let id = service
            .create_record(&NewSubmission::provisional(&subject(), json!({})))
            .await
            .unwrap();

        let rows = service.list_records().await.unwrap();
        assert_eq!(rows[0]["id"], json!(id));
        assert_eq!(rows[1]["id"], "old");
    }
}
