use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{DeviceBackend, DeviceConfig, DeviceKind, HardwareTracks, MediaFrame};
use crate::error::{CaptureError, CaptureResult};

/// Shared entry point to the camera hardware
///
/// At most one `DeviceSession` is open at a time across every controller
/// holding the same `MediaDevices`.
pub struct MediaDevices {
    backend: Arc<dyn DeviceBackend>,
    config: DeviceConfig,
    active: Arc<Mutex<Option<DeviceKind>>>,
}

impl MediaDevices {
    pub fn new(backend: Arc<dyn DeviceBackend>, config: DeviceConfig) -> Self {
        Self {
            backend,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Open a session for `kind`
    ///
    /// Fails with `DeviceUnavailable` while another session is open.
    pub async fn open(&self, kind: DeviceKind) -> CaptureResult<DeviceSession> {
        let claim = SlotClaim::take(&self.active, kind)?;

        debug!("Acquiring {} via {}", kind.label(), self.backend.name());

        match self.backend.acquire(kind, &self.config).await {
            Ok(stream) => {
                claim.keep();
                info!("Device session opened: {}", kind.label());
                Ok(DeviceSession {
                    kind,
                    frames: Some(stream.frames),
                    tracks: Some(stream.tracks),
                    slot: Arc::clone(&self.active),
                })
            }
            Err(e) => {
                warn!("Failed to acquire {}: {}", kind.label(), e);
                Err(e)
            }
        }
    }

    /// Kind of the currently open session, if any
    pub fn active(&self) -> Option<DeviceKind> {
        *self.active.lock()
    }
}

/// Claim on the device slot held while a backend acquires
///
/// Released on drop unless kept, so a failed or abandoned `open` never
/// leaves the slot occupied.
struct SlotClaim {
    slot: Arc<Mutex<Option<DeviceKind>>>,
    kind: DeviceKind,
    kept: bool,
}

impl SlotClaim {
    fn take(slot: &Arc<Mutex<Option<DeviceKind>>>, kind: DeviceKind) -> CaptureResult<Self> {
        let mut active = slot.lock();
        if let Some(current) = *active {
            warn!(
                "Refusing to open {} session: {} session still open",
                kind.label(),
                current.label()
            );
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} session already open",
                current.label()
            )));
        }
        *active = Some(kind);

        Ok(Self {
            slot: Arc::clone(slot),
            kind,
            kept: false,
        })
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        let mut active = self.slot.lock();
        if *active == Some(self.kind) {
            *active = None;
            debug!("Released {} slot without a session", self.kind.label());
        }
    }
}

/// A live handle to camera/microphone hardware
///
/// `close()` is idempotent; dropping an unclosed session closes it.
pub struct DeviceSession {
    kind: DeviceKind,
    frames: Option<mpsc::Receiver<MediaFrame>>,
    tracks: Option<Box<dyn HardwareTracks>>,
    slot: Arc<Mutex<Option<DeviceKind>>>,
}

impl DeviceSession {
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.tracks.is_some()
    }

    /// Wait for the next frame; `None` once the stream ends or the session is closed
    pub async fn next_frame(&mut self) -> Option<MediaFrame> {
        match self.frames.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Drain everything already buffered and return the newest frame
    pub fn latest_frame(&mut self) -> Option<MediaFrame> {
        let rx = self.frames.as_mut()?;
        let mut latest = None;
        while let Ok(frame) = rx.try_recv() {
            latest = Some(frame);
        }
        latest
    }

    /// Take every frame already buffered without waiting
    pub fn drain_buffered(&mut self) -> Vec<MediaFrame> {
        let mut frames = Vec::new();
        if let Some(rx) = self.frames.as_mut() {
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }

    /// Release all hardware tracks
    pub fn close(&mut self) {
        let Some(mut tracks) = self.tracks.take() else {
            return;
        };
        tracks.stop();
        self.frames = None;

        let mut active = self.slot.lock();
        if *active == Some(self.kind) {
            *active = None;
        }
        info!("Device session closed: {}", self.kind.label());
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("Device session dropped while open, closing: {}", self.kind.label());
            self.close();
        }
    }
}
