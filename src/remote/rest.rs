use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::submission::{
    MediaStorage, NewSubmission, RecordId, RecordPatch, SubmissionReader, SubmissionStore,
};

#[derive(Deserialize)]
struct BucketInfo {
    #[serde(default)]
    public: bool,
}

#[derive(Deserialize)]
struct SignedUrl {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

/// Client for a PostgREST table plus an object storage API
pub struct RestService {
    client: reqwest::Client,
    base_url: String,
    table: String,
}

impl RestService {
    pub fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&config.api_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            table: config.table.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, String> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Err(format!("{}: {}", status, text))
    }
}

fn row_id(row: &Value) -> Option<RecordId> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl SubmissionStore for RestService {
    async fn create_record(&self, new: &NewSubmission) -> ServiceResult<RecordId> {
        let resp = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(new)
            .send()
            .await
            .map_err(|e| ServiceError::Write(e.to_string()))?;
        let resp = Self::check(resp).await.map_err(ServiceError::Write)?;

        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| ServiceError::Write(e.to_string()))?;

        rows.first()
            .and_then(row_id)
            .ok_or_else(|| ServiceError::Write("insert returned no id".to_string()))
    }

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> ServiceResult<()> {
        let resp = self
            .client
            .patch(self.table_url())
            .query(&[("id", format!("eq.{}", id))])
            .json(patch)
            .send()
            .await
            .map_err(|e| ServiceError::Write(e.to_string()))?;
        Self::check(resp).await.map_err(ServiceError::Write)?;

        debug!("Updated record {}", id);
        Ok(())
    }
}

#[async_trait]
impl SubmissionReader for RestService {
    async fn list_records(&self) -> ServiceResult<Vec<Value>> {
        let resp = self
            .client
            .get(self.table_url())
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await
            .map_err(|e| ServiceError::Write(e.to_string()))?;
        let resp = Self::check(resp).await.map_err(ServiceError::Write)?;

        resp.json()
            .await
            .map_err(|e| ServiceError::Write(e.to_string()))
    }
}

#[async_trait]
impl MediaStorage for RestService {
    async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ServiceResult<()> {
        let resp = self
            .client
            .post(self.storage_url(&format!("object/{}/{}", bucket, key)))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ServiceError::Upload(e.to_string()))?;
        Self::check(resp).await.map_err(ServiceError::Upload)?;
        Ok(())
    }

    async fn resolve_public_url(&self, bucket: &str, key: &str) -> Option<String> {
        let resp = match self
            .client
            .get(self.storage_url(&format!("bucket/{}", bucket)))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!("Bucket lookup for {} returned {}", bucket, resp.status());
                return None;
            }
            Err(e) => {
                warn!("Bucket lookup for {} failed: {}", bucket, e);
                return None;
            }
        };

        let info: BucketInfo = resp.json().await.ok()?;
        info.public
            .then(|| self.storage_url(&format!("object/public/{}/{}", bucket, key)))
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> ServiceResult<String> {
        let resp = self
            .client
            .post(self.storage_url(&format!("object/sign/{}/{}", bucket, key)))
            .json(&json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await
            .map_err(|e| ServiceError::Url(e.to_string()))?;
        let resp = Self::check(resp).await.map_err(ServiceError::Url)?;

        let signed: SignedUrl = resp
            .json()
            .await
            .map_err(|e| ServiceError::Url(e.to_string()))?;

        if signed.signed_url.starts_with("http") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
        }
    }
}
