use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::image::{encode_png, StillImage};
use crate::device::{DeviceKind, DeviceSession, MediaDevices, MediaFrame, Track};
use crate::error::{CaptureError, CaptureResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StillState {
    #[default]
    Idle,
    /// Preview running on the rear camera
    Live,
    Captured,
}

impl fmt::Display for StillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StillState::Idle => f.write_str("Idle"),
            StillState::Live => f.write_str("Live"),
            StillState::Captured => f.write_str("Captured"),
        }
    }
}

/// On-demand document photo capture
pub struct StillCapture {
    devices: Arc<MediaDevices>,
    content_type: String,
    state: StillState,
    session: Option<DeviceSession>,
    recording: watch::Receiver<bool>,
    image_tx: mpsc::UnboundedSender<StillImage>,
}

impl StillCapture {
    /// `recording` is the recorder's "recording in progress" flag
    pub fn new(
        devices: Arc<MediaDevices>,
        recording: watch::Receiver<bool>,
    ) -> (Self, mpsc::UnboundedReceiver<StillImage>) {
        let (image_tx, image_rx) = mpsc::unbounded_channel();

        let controller = Self {
            devices,
            content_type: "image/png".to_string(),
            state: StillState::Idle,
            session: None,
            recording,
            image_tx,
        };

        (controller, image_rx)
    }

    pub fn state(&self) -> StillState {
        self.state
    }

    pub fn is_blocked(&self) -> bool {
        *self.recording.borrow()
    }

    /// Open the rear camera and start the preview
    pub async fn go_live(&mut self) -> CaptureResult<()> {
        match self.state {
            StillState::Live => return Ok(()),
            StillState::Captured => {
                return Err(CaptureError::InvalidState(self.state.to_string()));
            }
            StillState::Idle => {}
        }

        let session = self.devices.open(DeviceKind::RearVideo).await?;
        self.session = Some(session);
        self.state = StillState::Live;
        info!("Document preview live");
        Ok(())
    }

    /// Take one frame from the preview, encode it and release the camera
    pub async fn capture(&mut self) -> CaptureResult<StillImage> {
        if self.is_blocked() {
            warn!("Photo capture refused: recording in progress");
            return Err(CaptureError::Blocked);
        }
        if self.state != StillState::Live {
            return Err(CaptureError::InvalidState(self.state.to_string()));
        }

        let Some(frame) = self.preview_frame().await else {
            self.release();
            self.state = StillState::Idle;
            return Err(CaptureError::DeviceUnavailable(
                "preview stream ended".to_string(),
            ));
        };

        let Track::Video { width, height, rgba } = frame.track else {
            return Err(CaptureError::DeviceUnavailable(
                "preview produced no video".to_string(),
            ));
        };

        let bytes = encode_png(width, height, &rgba)?;
        self.release();
        self.state = StillState::Captured;

        let image = StillImage {
            bytes,
            content_type: self.content_type.clone(),
            width,
            height,
            captured_at: Utc::now(),
        };

        info!("Document photo captured: {}x{}, {} bytes", width, height, image.bytes.len());

        if self.image_tx.send(image.clone()).is_err() {
            warn!("Image receiver dropped");
        }

        Ok(image)
    }

    /// Discard the captured photo and reopen the preview
    pub async fn retake(&mut self) -> CaptureResult<()> {
        if self.state != StillState::Captured {
            return Err(CaptureError::InvalidState(self.state.to_string()));
        }

        self.release();
        let session = self.devices.open(DeviceKind::RearVideo).await?;
        self.session = Some(session);
        self.state = StillState::Live;
        debug!("Retake: preview reopened");
        Ok(())
    }

    /// Teardown on unmount
    pub fn shutdown(&mut self) {
        self.release();
        if self.state == StillState::Live {
            self.state = StillState::Idle;
        }
    }

    async fn preview_frame(&mut self) -> Option<MediaFrame> {
        let session = self.session.as_mut()?;

        if let Some(frame) = session
            .drain_buffered()
            .into_iter()
            .rev()
            .find(MediaFrame::is_video)
        {
            return Some(frame);
        }

        while let Some(frame) = session.next_frame().await {
            if frame.is_video() {
                return Some(frame);
            }
        }
        None
    }

    fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

impl Drop for StillCapture {
    fn drop(&mut self) {
        self.release();
    }
}
