use chrono::Utc;
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::segment::{SegmentEncoder, VideoSegment};
use super::state::{RecorderState, StopLatch, StopReason};
use crate::device::{DeviceKind, DeviceSession, MediaDevices};
use crate::error::CaptureResult;

/// Configuration for the timed recorder
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Hard deadline for one recording
    /// Default: 10 seconds
    pub duration: Duration,

    /// Content type stamped on finished segments
    pub content_type: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            content_type: "video/webm".to_string(),
        }
    }
}

struct ActiveRecording {
    latch: StopLatch,
    task: JoinHandle<()>,
}

/// Fixed-duration self-video capture
///
/// The deadline, `stop()`, `page_hidden()` and session cancellation all
/// funnel into one `StopLatch`; the recording task finalizes exactly once
/// and emits the segment on the channel returned by `new`.
pub struct TimedRecorder {
    devices: Arc<MediaDevices>,
    config: RecorderConfig,
    state: Arc<RwLock<RecorderState>>,
    recording_tx: Arc<watch::Sender<bool>>,
    segment_tx: mpsc::UnboundedSender<VideoSegment>,
    cancel: CancellationToken,
    current: Arc<SyncMutex<Option<StopLatch>>>,
    active: Mutex<Option<ActiveRecording>>,
}

impl TimedRecorder {
    /// Create a recorder and the receiver its finished segments arrive on
    pub fn new(
        devices: Arc<MediaDevices>,
        config: RecorderConfig,
    ) -> (Self, mpsc::UnboundedReceiver<VideoSegment>) {
        let (segment_tx, segment_rx) = mpsc::unbounded_channel();
        let (recording_tx, _) = watch::channel(false);

        let recorder = Self {
            devices,
            config,
            state: Arc::new(RwLock::new(RecorderState::Idle)),
            recording_tx: Arc::new(recording_tx),
            segment_tx,
            cancel: CancellationToken::new(),
            current: Arc::new(SyncMutex::new(None)),
            active: Mutex::new(None),
        };

        (recorder, segment_rx)
    }

    /// Stop any recording when `token` is cancelled (host session teardown)
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> RecorderState {
        *self.state.read()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// "Recording in progress" flag, consumed by the still capture controller
    pub fn recording_flag(&self) -> watch::Receiver<bool> {
        self.recording_tx.subscribe()
    }

    /// Begin a recording
    ///
    /// No-op unless the recorder is `Idle`. A finished previous recording is
    /// fully torn down before the device is reopened.
    pub async fn start(&self) -> CaptureResult<()> {
        let mut active = self.active.lock().await;

        let state = self.state();
        if state != RecorderState::Idle {
            debug!("Ignoring start while {}", state);
            return Ok(());
        }

        if let Some(previous) = active.take() {
            previous.latch.trigger(StopReason::Requested);
            if let Err(e) = previous.task.await {
                error!("Previous recording task panicked: {}", e);
            }
        }

        let requesting = RequestingGuard::enter(Arc::clone(&self.state));
        info!(
            "Requesting camera for {:.0}s recording",
            self.config.duration.as_secs_f64()
        );

        let session = match self.devices.open(DeviceKind::FrontVideoAudio).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Recording not started: {}", e);
                return Err(e);
            }
        };
        requesting.disarm();

        let latch = StopLatch::new(self.cancel.child_token());
        *self.current.lock() = Some(latch.clone());
        *self.state.write() = RecorderState::Recording;
        self.recording_tx.send_replace(true);

        let task = RecordingTask {
            session,
            encoder: SegmentEncoder::new(self.config.content_type.clone()),
            latch: latch.clone(),
            duration: self.config.duration,
            state: Arc::clone(&self.state),
            recording_tx: Arc::clone(&self.recording_tx),
            segment_tx: self.segment_tx.clone(),
            current: Arc::clone(&self.current),
        };

        *active = Some(ActiveRecording {
            latch,
            task: tokio::spawn(task.run()),
        });

        Ok(())
    }

    /// Stop the current recording and wait until its segment is emitted
    ///
    /// Safe to call repeatedly and concurrently; only the first call does work.
    pub async fn stop(&self) {
        if let Some(latch) = self.current.lock().as_ref() {
            latch.trigger(StopReason::Requested);
        }

        let mut active = self.active.lock().await;
        if let Some(recording) = active.take() {
            recording.latch.trigger(StopReason::Requested);
            if let Err(e) = recording.task.await {
                error!("Recording task panicked: {}", e);
            }
        }
    }

    /// The surrounding page lost visibility; stop early, keeping what was captured
    pub fn page_hidden(&self) {
        if let Some(latch) = self.current.lock().as_ref() {
            latch.trigger(StopReason::PageHidden);
        }
    }

    /// Teardown on unmount: stop and release the device
    pub async fn shutdown(&self) {
        self.stop().await;
        debug!("Recorder shut down");
    }
}

/// Holds the recorder in `Requesting` while the device is acquired
///
/// Dropping it without `disarm` (failed acquisition, or the `start` future
/// being abandoned) puts the recorder back to `Idle`.
struct RequestingGuard {
    state: Arc<RwLock<RecorderState>>,
    armed: bool,
}

impl RequestingGuard {
    fn enter(state: Arc<RwLock<RecorderState>>) -> Self {
        *state.write() = RecorderState::Requesting;
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RequestingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.write();
        if *state == RecorderState::Requesting {
            *state = RecorderState::Idle;
            debug!("Camera request abandoned, recorder back to Idle");
        }
    }
}

struct RecordingTask {
    session: DeviceSession,
    encoder: SegmentEncoder,
    latch: StopLatch,
    duration: Duration,
    state: Arc<RwLock<RecorderState>>,
    recording_tx: Arc<watch::Sender<bool>>,
    segment_tx: mpsc::UnboundedSender<VideoSegment>,
    current: Arc<SyncMutex<Option<StopLatch>>>,
}

impl RecordingTask {
    async fn run(mut self) {
        let captured_at = Utc::now();
        let started = Instant::now();
        let deadline = sleep(self.duration);
        tokio::pin!(deadline);

        info!("Recording started");

        loop {
            tokio::select! {
                biased;
                _ = self.latch.triggered() => break,
                _ = &mut deadline => {
                    self.latch.trigger(StopReason::Deadline);
                    break;
                }
                frame = self.session.next_frame() => match frame {
                    Some(frame) => self.encoder.push(&frame),
                    None => {
                        self.latch.trigger(StopReason::StreamEnded);
                        break;
                    }
                },
            }
        }

        let duration = started.elapsed();
        *self.state.write() = RecorderState::Finalizing;

        for frame in self.session.drain_buffered() {
            self.encoder.push(&frame);
        }
        self.session.close();

        let segment = self
            .encoder
            .finish(duration, captured_at, self.latch.reason());

        {
            let mut current = self.current.lock();
            *current = None;
        }
        *self.state.write() = RecorderState::Idle;
        self.recording_tx.send_replace(false);

        info!(
            "Recording finished ({:?}) after {:.1}s",
            segment.stop_reason,
            segment.duration.as_secs_f64()
        );

        if self.segment_tx.send(segment).is_err() {
            warn!("Segment receiver dropped, recording discarded");
        }
    }
}
