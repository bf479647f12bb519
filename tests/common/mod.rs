#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use kyc_capture::device::{DeviceConfig, MediaDevices, SyntheticBehavior, SyntheticCamera};
use kyc_capture::host::{HostContext, Locale, LoggingShell};
use kyc_capture::notify::{MediaForward, Notification, Notifier};
use kyc_capture::recording::{SegmentEncoder, StopReason, VideoSegment};
use kyc_capture::remote::InMemoryService;
use kyc_capture::still::{encode_png, StillImage};
use kyc_capture::submission::{
    Collaborators, MediaStorage, NewSubmission, RecordId, RecordPatch, SubjectIdentity,
    SubmissionStore,
};
use kyc_capture::{ServiceError, ServiceResult};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub fn subject() -> SubjectIdentity {
    SubjectIdentity {
        id: 5001,
        first_name: "Olena".to_string(),
        last_name: Some("Koval".to_string()),
        username: Some("okoval".to_string()),
        language_code: Some("uk".to_string()),
        is_premium: Some(false),
    }
}

pub fn host() -> HostContext {
    HostContext::new(
        subject(),
        json!({ "platform": "ios", "chat_type": "private", "start_param": "kyc" }),
    )
}

pub fn camera(behavior: SyntheticBehavior) -> (Arc<SyntheticCamera>, Arc<MediaDevices>) {
    let camera = Arc::new(SyntheticCamera::with_behavior(behavior));
    let devices = Arc::new(MediaDevices::new(camera.clone(), DeviceConfig::default()));
    (camera, devices)
}

/// Camera whose acquisition takes `delay`, like an unanswered permission prompt
pub fn slow_camera(delay: Duration) -> (Arc<SyntheticCamera>, Arc<MediaDevices>) {
    let camera = Arc::new(SyntheticCamera::new().with_acquire_delay(delay));
    let devices = Arc::new(MediaDevices::new(camera.clone(), DeviceConfig::default()));
    (camera, devices)
}

/// A small finished segment without going through the recorder
pub fn segment() -> VideoSegment {
    let encoder = SegmentEncoder::new("video/webm");
    encoder.finish(Duration::from_secs(10), Utc::now(), StopReason::Deadline)
}

pub fn image() -> StillImage {
    let rgba = vec![200u8; 4 * 4 * 4];
    StillImage {
        bytes: encode_png(4, 4, &rgba).unwrap(),
        content_type: "image/png".to_string(),
        width: 4,
        height: 4,
        captured_at: Utc::now(),
    }
}

pub fn collaborators(
    store: Arc<dyn SubmissionStore>,
    storage: Arc<dyn MediaStorage>,
    notifier: Arc<dyn Notifier>,
    shell: Arc<LoggingShell>,
) -> Collaborators {
    Collaborators {
        store,
        storage,
        notifier,
        shell,
    }
}

/// Collaborators all backed by one in-memory service
pub fn in_memory(
    service: &Arc<InMemoryService>,
    notifier: &Arc<RecordingNotifier>,
    shell: &Arc<LoggingShell>,
) -> Collaborators {
    collaborators(
        service.clone(),
        service.clone(),
        notifier.clone(),
        shell.clone(),
    )
}

/// Storage whose uploads to one bucket take `delay`
pub struct SlowBucket {
    pub inner: Arc<InMemoryService>,
    pub bucket: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl MediaStorage for SlowBucket {
    async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ServiceResult<()> {
        if bucket == self.bucket {
            tokio::time::sleep(self.delay).await;
        }
        self.inner
            .upload_bytes(bucket, key, bytes, content_type)
            .await
    }

    async fn resolve_public_url(&self, bucket: &str, key: &str) -> Option<String> {
        self.inner.resolve_public_url(bucket, key).await
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> ServiceResult<String> {
        self.inner.create_signed_url(bucket, key, ttl).await
    }
}

/// Remote service whose calls never settle
pub struct PendingService;

#[async_trait]
impl SubmissionStore for PendingService {
    async fn create_record(&self, _new: &NewSubmission) -> ServiceResult<RecordId> {
        std::future::pending().await
    }

    async fn update_record(&self, _id: &str, _patch: &RecordPatch) -> ServiceResult<()> {
        std::future::pending().await
    }
}

#[async_trait]
impl MediaStorage for PendingService {
    async fn upload_bytes(
        &self,
        _bucket: &str,
        _key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> ServiceResult<()> {
        std::future::pending().await
    }

    async fn resolve_public_url(&self, _bucket: &str, _key: &str) -> Option<String> {
        std::future::pending().await
    }

    async fn create_signed_url(
        &self,
        _bucket: &str,
        _key: &str,
        _ttl: Duration,
    ) -> ServiceResult<String> {
        std::future::pending().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub recipient: String,
    pub text: String,
    pub locale: Locale,
}

/// Notifier that remembers what it was asked to deliver
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
    pub media: Mutex<Vec<(String, MediaForward)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn media(&self) -> Vec<(String, MediaForward)> {
        self.media.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        notification: &Notification,
        locale: Locale,
    ) -> ServiceResult<()> {
        self.sent.lock().push(Sent {
            recipient: recipient.to_string(),
            text: notification.render(locale),
            locale,
        });
        if self.fail {
            return Err(ServiceError::Delivery("bot blocked".to_string()));
        }
        Ok(())
    }

    async fn forward_media(
        &self,
        recipient: &str,
        media: &MediaForward,
        _locale: Locale,
    ) -> ServiceResult<()> {
        self.media
            .lock()
            .push((recipient.to_string(), media.clone()));
        if self.fail {
            return Err(ServiceError::Delivery("bot blocked".to_string()));
        }
        Ok(())
    }
}
