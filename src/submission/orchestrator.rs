use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::keys::UploadKeys;
use super::record::{NewSubmission, RecordId, RecordPatch, SubjectIdentity};
use super::service::{resolve_durable_url, MediaStorage, SubmissionStore};
use crate::error::ServiceResult;
use crate::host::{HostContext, HostShell, Locale};
use crate::notify::{MediaForward, Notification, Notifier};
use crate::recording::VideoSegment;
use crate::still::StillImage;

/// How long the admin forward waits for an in-flight video reference
const VIDEO_SETTLE_WAIT: Duration = Duration::from_secs(60);

/// Visible workflow step; only ever advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    CapturingVideo,
    CapturingDocument,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::CapturingVideo => "capturingVideo",
            Step::CapturingDocument => "capturingDocument",
            Step::Done => "done",
        };
        f.write_str(s)
    }
}

/// Background upload progress, for a front end's progress indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum UploadPhase {
    #[default]
    Idle,
    UploadingVideo,
    UploadingDocument,
    Finalizing,
}

/// Where media goes and who else hears about it
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    pub video_bucket: String,
    pub document_bucket: String,
    /// Lifetime of signed URLs used when a bucket has no public access
    /// Default: one year
    pub signed_url_ttl: Duration,
    /// Reviewer chat that receives the captured media after submission
    pub admin_chat_id: Option<String>,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            video_bucket: "videos".to_string(),
            document_bucket: "passports".to_string(),
            signed_url_ttl: Duration::from_secs(365 * 24 * 60 * 60),
            admin_chat_id: None,
        }
    }
}

/// External collaborators of one session
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SubmissionStore>,
    pub storage: Arc<dyn MediaStorage>,
    pub notifier: Arc<dyn Notifier>,
    pub shell: Arc<dyn HostShell>,
}

/// Requests to the record keeper, answered in the order they were issued
enum RecordRequest {
    /// Current id, creating a late record first if none exists
    Ensure(oneshot::Sender<Option<RecordId>>),
    /// Current id, never creating
    Lookup(oneshot::Sender<Option<RecordId>>),
}

#[derive(Debug, Default)]
struct RecordMirror {
    id: Option<RecordId>,
    meta: Map<String, Value>,
}

struct Inner {
    host: HostContext,
    locale: Locale,
    config: SubmissionConfig,
    services: Collaborators,
    keys: UploadKeys,
    requests: mpsc::UnboundedSender<RecordRequest>,
    record: Arc<Mutex<RecordMirror>>,
    amendments: Arc<Mutex<Map<String, Value>>>,
    step_tx: watch::Sender<Step>,
    phase_tx: watch::Sender<UploadPhase>,
    video_url: Mutex<Option<String>>,
    /// Video persists not yet finished
    videos_in_flight: watch::Sender<usize>,
    notified: AtomicBool,
    forwarded: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Drives one capture session from handoff to notification
///
/// Step changes happen synchronously inside the event handlers. Every
/// network operation runs in a spawned task whose failure is logged and
/// abandoned; none of them can move the step backwards.
#[derive(Clone)]
pub struct SubmissionOrchestrator {
    inner: Arc<Inner>,
}

impl SubmissionOrchestrator {
    /// Begin a session and issue the provisional record insert
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(host: HostContext, config: SubmissionConfig, services: Collaborators) -> Self {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (step_tx, _) = watch::channel(Step::CapturingVideo);
        let (phase_tx, _) = watch::channel(UploadPhase::Idle);
        let record = Arc::new(Mutex::new(RecordMirror::default()));
        let amendments = Arc::new(Mutex::new(Map::new()));
        let (videos_in_flight, _) = watch::channel(0);

        let provisional = NewSubmission::provisional(&host.subject, host.metadata_snapshot());
        let keeper = RecordKeeper {
            store: Arc::clone(&services.store),
            mirror: Arc::clone(&record),
            amendments: Arc::clone(&amendments),
            subject: host.subject.clone(),
        };
        tokio::spawn(keeper.run(provisional, requests_rx));

        info!(
            "Submission session started for subject {} ({})",
            host.subject.id,
            host.locale()
        );

        let inner = Inner {
            locale: host.locale(),
            keys: UploadKeys::new(Some(host.subject.id)),
            host,
            config,
            services,
            requests,
            record,
            amendments,
            step_tx,
            phase_tx,
            video_url: Mutex::new(None),
            videos_in_flight,
            notified: AtomicBool::new(false),
            forwarded: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn step(&self) -> Step {
        *self.inner.step_tx.borrow()
    }

    pub fn subscribe_steps(&self) -> watch::Receiver<Step> {
        self.inner.step_tx.subscribe()
    }

    pub fn phase(&self) -> UploadPhase {
        *self.inner.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<UploadPhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Id of the persisted record, once an insert has succeeded
    pub fn record_id(&self) -> Option<RecordId> {
        self.inner.record.lock().id.clone()
    }

    pub fn locale(&self) -> Locale {
        self.inner.locale
    }

    /// A finished recording arrived
    ///
    /// The step moves to `capturingDocument` before this returns; the upload
    /// runs in the background.
    pub fn on_video_segment(&self, segment: VideoSegment) {
        self.inner.advance(Step::CapturingDocument);

        let Some(id_rx) = self.inner.request(RecordRequest::Ensure) else {
            return;
        };

        let in_flight = VideoInFlight::enter(Arc::clone(&self.inner));
        let inner = Arc::clone(&self.inner);
        self.inner.track(tokio::spawn(async move {
            inner.persist_video(segment, id_rx).await;
            drop(in_flight);
        }));
    }

    /// A captured document photo arrived
    pub fn on_document_image(&self, image: StillImage) {
        if self.step() == Step::CapturingVideo {
            debug!("Document image arrived before the video segment");
        }

        let Some(id_rx) = self.inner.request(RecordRequest::Lookup) else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        self.inner.track(tokio::spawn(async move {
            inner.persist_document(image, id_rx).await;
        }));
    }

    /// Merge an extra field into the record metadata
    ///
    /// Never touches media references or status. Without a record yet the
    /// field is kept and written by the late insert.
    pub fn amend_metadata(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.inner.amendments.lock().insert(key.clone(), value);

        let Some(id_rx) = self.inner.request(RecordRequest::Lookup) else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        self.inner.track(tokio::spawn(async move {
            let Ok(Some(id)) = id_rx.await else {
                warn!("Metadata amendment '{}' deferred: no record yet", key);
                return;
            };

            let meta = inner.merged_meta();
            let patch = RecordPatch::metadata(meta.clone());
            match inner.services.store.update_record(&id, &patch).await {
                Ok(()) => {
                    if let Value::Object(map) = meta {
                        inner.record.lock().meta = map;
                    }
                    debug!("Record {} metadata amended with '{}'", id, key);
                }
                Err(e) => warn!("Metadata amendment on record {} failed: {}", id, e),
            }
        }));
    }

    /// The close affordance of the terminal step
    ///
    /// Asks the host to end the session; does nothing before `done`.
    pub fn close(&self) -> bool {
        if self.step() != Step::Done {
            debug!("Close ignored in step {}", self.step());
            return false;
        }
        self.inner.services.shell.request_close();
        true
    }

    /// Feed controller output into the orchestrator until both channels close
    pub fn attach(
        &self,
        mut segments: mpsc::UnboundedReceiver<VideoSegment>,
        mut images: mpsc::UnboundedReceiver<StillImage>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut segments_open = true;
            let mut images_open = true;

            while segments_open || images_open {
                tokio::select! {
                    segment = segments.recv(), if segments_open => match segment {
                        Some(segment) => this.on_video_segment(segment),
                        None => segments_open = false,
                    },
                    image = images.recv(), if images_open => match image {
                        Some(image) => this.on_document_image(image),
                        None => images_open = false,
                    },
                }
            }
            debug!("Capture channels closed");
        })
    }

    /// Wait until the visible step reaches `target`
    pub async fn wait_for_step(&self, target: Step) -> Step {
        let mut rx = self.subscribe_steps();
        let reached = match rx.wait_for(|step| *step >= target).await {
            Ok(step) => *step,
            Err(_) => self.step(),
        };
        reached
    }

    /// Wait for every background upload and update spawned so far
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();

            if pending.is_empty() {
                return;
            }

            for result in join_all(pending).await {
                if let Err(e) = result {
                    error!("Background task panicked: {}", e);
                }
            }
        }
    }
}

impl Inner {
    fn advance(&self, to: Step) {
        let advanced = self.step_tx.send_if_modified(|step| {
            if *step < to {
                *step = to;
                true
            } else {
                false
            }
        });
        if advanced {
            info!("Step advanced to {}", to);
        }
    }

    fn set_phase(&self, phase: UploadPhase) {
        self.phase_tx.send_replace(phase);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn request(
        &self,
        make: fn(oneshot::Sender<Option<RecordId>>) -> RecordRequest,
    ) -> Option<oneshot::Receiver<Option<RecordId>>> {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(make(tx)).is_err() {
            error!("Record keeper is gone");
            return None;
        }
        Some(rx)
    }

    fn merged_meta(&self) -> Value {
        let mut meta = self.record.lock().meta.clone();
        for (k, v) in self.amendments.lock().iter() {
            meta.insert(k.clone(), v.clone());
        }
        Value::Object(meta)
    }

    async fn upload(
        &self,
        bucket: &str,
        bytes: Vec<u8>,
        content_type: &str,
        captured_at: chrono::DateTime<chrono::Utc>,
    ) -> ServiceResult<String> {
        let key = self.keys.next(captured_at, content_type);
        let storage = self.services.storage.as_ref();

        storage
            .upload_bytes(bucket, &key, bytes, content_type)
            .await?;
        debug!("Uploaded {}/{}", bucket, key);

        resolve_durable_url(storage, bucket, &key, self.config.signed_url_ttl).await
    }

    async fn persist_video(
        &self,
        segment: VideoSegment,
        id_rx: oneshot::Receiver<Option<RecordId>>,
    ) {
        self.set_phase(UploadPhase::UploadingVideo);

        let Ok(Some(id)) = id_rx.await else {
            warn!("Video upload abandoned: no record could be created");
            self.settle_phase(UploadPhase::UploadingVideo);
            return;
        };

        let url = match self
            .upload(
                &self.config.video_bucket,
                segment.bytes,
                &segment.content_type,
                segment.captured_at,
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!("Video upload for record {} abandoned: {}", id, e);
                self.settle_phase(UploadPhase::UploadingVideo);
                return;
            }
        };

        match self
            .services
            .store
            .update_record(&id, &RecordPatch::video(url.clone()))
            .await
        {
            Ok(()) => {
                info!("Record {} has its video reference", id);
                *self.video_url.lock() = Some(url);
            }
            Err(e) => warn!("Video reference update on record {} failed: {}", id, e),
        }

        self.settle_phase(UploadPhase::UploadingVideo);
    }

    async fn persist_document(
        &self,
        image: StillImage,
        id_rx: oneshot::Receiver<Option<RecordId>>,
    ) {
        self.set_phase(UploadPhase::UploadingDocument);

        let Ok(Some(id)) = id_rx.await else {
            error!(
                "Submission for subject {} not persisted: record was never created",
                self.host.subject.id
            );
            self.settle_phase(UploadPhase::UploadingDocument);
            return;
        };

        let url = match self
            .upload(
                &self.config.document_bucket,
                image.bytes,
                &image.content_type,
                image.captured_at,
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!("Document upload for record {} abandoned: {}", id, e);
                self.settle_phase(UploadPhase::UploadingDocument);
                return;
            }
        };

        self.set_phase(UploadPhase::Finalizing);

        let patch = RecordPatch::document_submitted(url.clone());
        if let Err(e) = self.services.store.update_record(&id, &patch).await {
            warn!("Submission of record {} failed: {}", id, e);
            self.settle_phase(UploadPhase::Finalizing);
            return;
        }

        info!("Record {} submitted", id);
        self.advance(Step::Done);
        self.settle_phase(UploadPhase::Finalizing);

        self.notify_subject().await;
        self.forward_to_admin(Some(url)).await;
    }

    /// Return to `Idle` unless another upload has taken over the indicator
    fn settle_phase(&self, expected: UploadPhase) {
        self.phase_tx.send_if_modified(|phase| {
            if *phase == expected {
                *phase = UploadPhase::Idle;
                true
            } else {
                false
            }
        });
    }

    async fn notify_subject(&self) {
        if self.notified.swap(true, Ordering::SeqCst) {
            debug!("Submission notification already sent");
            return;
        }

        let recipient = self.host.subject.id.to_string();
        let notification = Notification::submitted()
            .with_variable("name", self.host.subject.display_name());

        if let Err(e) = self
            .services
            .notifier
            .notify(&recipient, &notification, self.locale)
            .await
        {
            warn!("Submission notification to {} failed: {}", recipient, e);
        }
    }

    async fn forward_to_admin(&self, photo_url: Option<String>) {
        let Some(admin) = self.config.admin_chat_id.as_deref() else {
            return;
        };
        if self.forwarded.swap(true, Ordering::SeqCst) {
            debug!("Media already forwarded to {}", admin);
            return;
        }

        let mut in_flight = self.videos_in_flight.subscribe();
        let settled = tokio::time::timeout(
            VIDEO_SETTLE_WAIT,
            in_flight.wait_for(|pending| *pending == 0),
        )
        .await
        .is_ok();
        if !settled {
            warn!("Video reference still pending, forwarding without waiting further");
        }

        let subject = &self.host.subject;
        let caption = Notification::text("{{name}} (id {{id}}) @{{username}}")
            .with_variable("name", subject.display_name())
            .with_variable("id", subject.id.to_string())
            .with_variable("username", subject.username.clone().unwrap_or_default());

        let media = MediaForward {
            photo_url,
            video_url: self.video_url.lock().clone(),
            caption,
        };

        if let Err(e) = self
            .services
            .notifier
            .forward_media(admin, &media, self.locale)
            .await
        {
            warn!("Media forward to {} failed: {}", admin, e);
        }
    }
}

/// Counts one video persist for as long as it is alive
struct VideoInFlight {
    inner: Arc<Inner>,
}

impl VideoInFlight {
    fn enter(inner: Arc<Inner>) -> Self {
        inner.videos_in_flight.send_modify(|n| *n += 1);
        Self { inner }
    }
}

impl Drop for VideoInFlight {
    fn drop(&mut self) {
        self.inner
            .videos_in_flight
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Owns record creation for one session
///
/// Requests are served strictly in arrival order, so a lookup issued after a
/// video segment sees the record that segment's ensure created.
struct RecordKeeper {
    store: Arc<dyn SubmissionStore>,
    mirror: Arc<Mutex<RecordMirror>>,
    amendments: Arc<Mutex<Map<String, Value>>>,
    subject: SubjectIdentity,
}

impl RecordKeeper {
    async fn run(
        self,
        provisional: NewSubmission,
        mut requests: mpsc::UnboundedReceiver<RecordRequest>,
    ) {
        let mut id = self.create(provisional, "provisional").await;

        while let Some(request) = requests.recv().await {
            let reply = match request {
                RecordRequest::Ensure(reply) => {
                    if id.is_none() {
                        let late = NewSubmission::provisional(&self.subject, self.late_meta());
                        id = self.create(late, "late").await;
                    }
                    reply
                }
                RecordRequest::Lookup(reply) => reply,
            };
            let _ = reply.send(id.clone());
        }
    }

    /// Metadata of a record created after the provisional insert failed,
    /// carrying any amendments made in the meantime
    fn late_meta(&self) -> Value {
        let mut meta = Map::new();
        meta.insert("created_late".to_string(), json!(true));
        meta.insert("ts".to_string(), json!(chrono::Utc::now().to_rfc3339()));
        for (k, v) in self.amendments.lock().iter() {
            meta.insert(k.clone(), v.clone());
        }
        Value::Object(meta)
    }

    async fn create(&self, new: NewSubmission, kind: &str) -> Option<RecordId> {
        match self.store.create_record(&new).await {
            Ok(id) => {
                info!("Created {} record {}", kind, id);
                let mut mirror = self.mirror.lock();
                mirror.id = Some(id.clone());
                mirror.meta = match new.meta {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Some(id)
            }
            Err(e) => {
                warn!("Creating {} record failed, will retry lazily: {}", kind, e);
                None
            }
        }
    }
}
