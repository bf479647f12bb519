use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

use super::state::StopReason;
use crate::device::{MediaFrame, Track};

/// Header written at the start of every segment
pub const SEGMENT_MAGIC: &[u8; 8] = b"KYCSEG01";

const TAG_VIDEO: u8 = 1;
const TAG_AUDIO: u8 = 2;

/// A finished recording, ready for upload
#[derive(Debug, Clone)]
pub struct VideoSegment {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Wall time between start of capture and stop
    pub duration: Duration,
    pub video_frames: usize,
    pub audio_frames: usize,
    /// When capture started, used for upload keys
    pub captured_at: DateTime<Utc>,
    pub stop_reason: StopReason,
}

impl VideoSegment {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.video_frames == 0 && self.audio_frames == 0
    }
}

/// Assembles captured frames into one binary segment
///
/// Each frame is stored as `tag u8 | timestamp_ms u64 LE | len u32 LE | payload`.
pub struct SegmentEncoder {
    buf: Vec<u8>,
    content_type: String,
    video_frames: usize,
    audio_frames: usize,
    last_timestamp_ms: u64,
}

impl SegmentEncoder {
    pub fn new(content_type: impl Into<String>) -> Self {
        let mut buf = Vec::with_capacity(64 * 1024);
        buf.extend_from_slice(SEGMENT_MAGIC);

        Self {
            buf,
            content_type: content_type.into(),
            video_frames: 0,
            audio_frames: 0,
            last_timestamp_ms: 0,
        }
    }

    pub fn push(&mut self, frame: &MediaFrame) {
        match &frame.track {
            Track::Video { width, height, rgba } => {
                let mut payload = Vec::with_capacity(8 + rgba.len());
                payload.extend_from_slice(&width.to_le_bytes());
                payload.extend_from_slice(&height.to_le_bytes());
                payload.extend_from_slice(rgba);
                self.write_record(TAG_VIDEO, frame.timestamp_ms, &payload);
                self.video_frames += 1;
            }
            Track::Audio { samples } => {
                let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                self.write_record(TAG_AUDIO, frame.timestamp_ms, &payload);
                self.audio_frames += 1;
            }
        }
        self.last_timestamp_ms = frame.timestamp_ms;
    }

    fn write_record(&mut self, tag: u8, timestamp_ms: u64, payload: &[u8]) {
        self.buf.push(tag);
        self.buf.extend_from_slice(&timestamp_ms.to_le_bytes());
        self.buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(payload);
    }

    pub fn frames_written(&self) -> usize {
        self.video_frames + self.audio_frames
    }

    /// Flush and hand back the complete segment
    pub fn finish(
        self,
        duration: Duration,
        captured_at: DateTime<Utc>,
        stop_reason: StopReason,
    ) -> VideoSegment {
        debug!(
            "Segment media span ends at {}ms, wall duration {:?}",
            self.last_timestamp_ms, duration
        );
        info!(
            "Segment complete: {} video / {} audio frames, {} bytes, {:.1}s",
            self.video_frames,
            self.audio_frames,
            self.buf.len(),
            duration.as_secs_f64()
        );

        VideoSegment {
            bytes: self.buf,
            content_type: self.content_type,
            duration,
            video_frames: self.video_frames,
            audio_frames: self.audio_frames,
            captured_at,
            stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_frame(ts: u64) -> MediaFrame {
        MediaFrame {
            track: Track::Video {
                width: 2,
                height: 1,
                rgba: vec![1, 2, 3, 4, 5, 6, 7, 8],
            },
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_empty_segment_has_header_only() {
        let encoder = SegmentEncoder::new("video/webm");
        let segment = encoder.finish(Duration::ZERO, Utc::now(), StopReason::Requested);

        assert_eq!(segment.bytes, SEGMENT_MAGIC.to_vec());
        assert!(segment.is_empty());
        assert_eq!(segment.content_type, "video/webm");
    }

    #[test]
    fn test_video_record_layout() {
        let mut encoder = SegmentEncoder::new("video/webm");
        encoder.push(&video_frame(40));
        let segment = encoder.finish(Duration::from_millis(40), Utc::now(), StopReason::Deadline);

        let record = &segment.bytes[SEGMENT_MAGIC.len()..];
        assert_eq!(record[0], TAG_VIDEO);
        assert_eq!(u64::from_le_bytes(record[1..9].try_into().unwrap()), 40);
        // width + height + 8 pixel bytes
        assert_eq!(u32::from_le_bytes(record[9..13].try_into().unwrap()), 16);
        assert_eq!(segment.video_frames, 1);
        assert_eq!(segment.audio_frames, 0);
    }

    #[test]
    fn test_audio_frames_counted_separately() {
        let mut encoder = SegmentEncoder::new("video/webm");
        encoder.push(&video_frame(0));
        encoder.push(&MediaFrame {
            track: Track::Audio {
                samples: vec![100, -100],
            },
            timestamp_ms: 0,
        });

        assert_eq!(encoder.frames_written(), 2);
        let segment = encoder.finish(Duration::from_millis(66), Utc::now(), StopReason::PageHidden);
        assert_eq!(segment.audio_frames, 1);
        assert_eq!(segment.stop_reason, StopReason::PageHidden);
    }
}
