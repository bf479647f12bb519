use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::backend::{
    AcquiredStream, DeviceBackend, DeviceConfig, DeviceKind, HardwareTracks, MediaFrame, Track,
};
use crate::error::{CaptureError, CaptureResult};

const MIN_FRAME_PERIOD: Duration = Duration::from_millis(1);

/// How the synthetic camera answers acquisition requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticBehavior {
    Grant,
    DenyPermission,
    Missing,
}

/// Generated camera/microphone frames paced by tokio time
///
/// Frames are dropped rather than queued when the consumer falls behind,
/// which matches how a live preview behaves.
pub struct SyntheticCamera {
    behavior: SyntheticBehavior,
    acquire_delay: Duration,
    acquisitions: AtomicUsize,
    releases: Arc<AtomicUsize>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::with_behavior(SyntheticBehavior::Grant)
    }

    pub fn with_behavior(behavior: SyntheticBehavior) -> Self {
        Self {
            behavior,
            acquire_delay: Duration::ZERO,
            acquisitions: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hold every acquisition for `delay`, like a pending permission prompt
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Number of successful acquisitions
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of streams whose tracks were stopped
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Streams acquired and not yet released
    pub fn open_streams(&self) -> usize {
        self.acquisitions() - self.releases()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

struct SyntheticTracks {
    running: Arc<AtomicBool>,
    releases: Arc<AtomicUsize>,
}

impl HardwareTracks for SyntheticTracks {
    fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticTracks {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl DeviceBackend for SyntheticCamera {
    async fn acquire(
        &self,
        kind: DeviceKind,
        config: &DeviceConfig,
    ) -> CaptureResult<AcquiredStream> {
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }

        match self.behavior {
            SyntheticBehavior::DenyPermission => {
                return Err(CaptureError::PermissionDenied(format!(
                    "{} access denied",
                    kind.label()
                )))
            }
            SyntheticBehavior::Missing => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "no {} device present",
                    kind.label()
                )))
            }
            SyntheticBehavior::Grant => {}
        }

        let (tx, rx) = mpsc::channel(8);
        let running = Arc::new(AtomicBool::new(true));
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        info!(
            "Synthetic {} stream started ({}x{} @ {}fps)",
            kind.label(),
            config.width,
            config.height,
            config.frame_rate
        );

        tokio::spawn(generate_frames(
            tx,
            Arc::clone(&running),
            kind,
            config.clone(),
        ));

        Ok(AcquiredStream {
            frames: rx,
            tracks: Box::new(SyntheticTracks {
                running,
                releases: Arc::clone(&self.releases),
            }),
        })
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

async fn generate_frames(
    tx: mpsc::Sender<MediaFrame>,
    running: Arc<AtomicBool>,
    kind: DeviceKind,
    config: DeviceConfig,
) {
    let frame_rate = config.frame_rate.max(1);
    let mut ticker = interval(frame_period(frame_rate));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let samples_per_tick = (config.audio_sample_rate / frame_rate) as usize;
    let mut tick: u64 = 0;

    loop {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let timestamp_ms = started.elapsed().as_millis() as u64;
        let mut frames = vec![MediaFrame {
            track: Track::Video {
                width: config.width,
                height: config.height,
                rgba: pattern(config.width, config.height, tick),
            },
            timestamp_ms,
        }];
        if kind.has_audio() {
            frames.push(MediaFrame {
                track: Track::Audio {
                    samples: vec![(tick % 256) as i16; samples_per_tick],
                },
                timestamp_ms,
            });
        }

        for frame in frames {
            match tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("Consumer behind, dropping frame {}", tick),
                Err(TrySendError::Closed(_)) => return,
            }
        }
        tick += 1;
    }

    debug!("Synthetic {} stream stopped after {} frames", kind.label(), tick);
}

/// Tick period for `frame_rate`, never shorter than a millisecond
fn frame_period(frame_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(frame_rate.max(1))).max(MIN_FRAME_PERIOD)
}

fn pattern(width: u32, height: u32, tick: u64) -> Vec<u8> {
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            rgba.push(((x as u64 + tick) % 256) as u8);
            rgba.push(((y as u64 + tick) % 256) as u8);
            rgba.push((tick % 256) as u8);
            rgba.push(255);
        }
    }
    rgba
}
