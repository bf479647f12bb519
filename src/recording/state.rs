use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Lifecycle of the timed recording controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    #[default]
    Idle,
    /// Waiting for the device session
    Requesting,
    Recording,
    /// Flushing the encoder and releasing the device
    Finalizing,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Idle => "Idle",
            RecorderState::Requesting => "Requesting",
            RecorderState::Recording => "Recording",
            RecorderState::Finalizing => "Finalizing",
        };
        f.write_str(name)
    }
}

/// What ended a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Deadline,
    Requested,
    PageHidden,
    /// The device stream ended on its own
    StreamEnded,
    /// The surrounding session was torn down
    Cancelled,
}

/// Single-shot stop action shared by every exit path of one recording
///
/// The first `trigger` wins and records its reason; later calls are no-ops.
#[derive(Clone)]
pub struct StopLatch {
    token: CancellationToken,
    reason: Arc<Mutex<Option<StopReason>>>,
}

impl StopLatch {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns `true` if this call performed the stop
    pub fn trigger(&self, reason: StopReason) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }
        info!("Recording stop triggered: {:?}", reason);
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.reason.lock().is_some() || self.token.is_cancelled()
    }

    pub fn reason(&self) -> StopReason {
        (*self.reason.lock()).unwrap_or(StopReason::Cancelled)
    }

    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_trigger_wins() {
        let latch = StopLatch::new(CancellationToken::new());

        assert!(latch.trigger(StopReason::Deadline));
        assert!(!latch.trigger(StopReason::PageHidden));
        assert!(!latch.trigger(StopReason::Requested));

        assert_eq!(latch.reason(), StopReason::Deadline);
    }

    #[test]
    fn test_parent_cancellation_reports_cancelled() {
        let parent = CancellationToken::new();
        let latch = StopLatch::new(parent.child_token());

        parent.cancel();

        assert!(latch.is_triggered());
        assert_eq!(latch.reason(), StopReason::Cancelled);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RecorderState::Finalizing.to_string(), "Finalizing");
        assert_eq!(RecorderState::default(), RecorderState::Idle);
    }
}
