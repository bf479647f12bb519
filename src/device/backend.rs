use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CaptureResult;

/// Which hardware a device session claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// User-facing camera plus microphone (self-video)
    FrontVideoAudio,
    /// Environment-facing camera (document photo)
    RearVideo,
}

impl DeviceKind {
    pub fn has_audio(&self) -> bool {
        matches!(self, DeviceKind::FrontVideoAudio)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::FrontVideoAudio => "front-video+audio",
            DeviceKind::RearVideo => "rear-video",
        }
    }
}

/// Payload of a single captured frame
#[derive(Debug, Clone, PartialEq)]
pub enum Track {
    /// Raw RGBA pixels, row-major
    Video {
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    },
    /// 16-bit PCM, mono
    Audio { samples: Vec<i16> },
}

/// One frame delivered by a device stream
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFrame {
    pub track: Track,
    /// Milliseconds since the stream was acquired
    pub timestamp_ms: u64,
}

impl MediaFrame {
    pub fn is_video(&self) -> bool {
        matches!(self.track, Track::Video { .. })
    }
}

/// Capture parameters requested from a backend
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub width: u32,
    pub height: u32,
    /// Video frames per second
    pub frame_rate: u32,
    /// Microphone sample rate in Hz
    pub audio_sample_rate: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            frame_rate: 15,
            audio_sample_rate: 16000,
        }
    }
}

/// Hardware tracks backing an acquired stream
pub trait HardwareTracks: Send {
    /// Stop every underlying track. Called at most once by `DeviceSession`.
    fn stop(&mut self);
}

/// What a backend hands back on successful acquisition
pub struct AcquiredStream {
    pub frames: mpsc::Receiver<MediaFrame>,
    pub tracks: Box<dyn HardwareTracks>,
}

/// Camera/microphone backend
///
/// Implementations:
/// - `SyntheticCamera`: generated frames driven by tokio time (tests, demo)
/// - host bridges supply their own implementation
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Acquire the hardware streams for `kind`
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`.
    async fn acquire(&self, kind: DeviceKind, config: &DeviceConfig)
        -> CaptureResult<AcquiredStream>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
