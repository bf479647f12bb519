//! Timed self-video recording
//!
//! This module provides the `TimedRecorder` controller that:
//! - Opens the front camera + microphone session
//! - Encodes frames into a single binary segment
//! - Stops on a fixed deadline, an explicit request or page visibility loss
//! - Emits exactly one finished segment per recording

mod recorder;
mod segment;
mod state;

pub use recorder::{RecorderConfig, TimedRecorder};
pub use segment::{SegmentEncoder, VideoSegment, SEGMENT_MAGIC};
pub use state::{RecorderState, StopLatch, StopReason};
