//! Error taxonomy
//!
//! Capture-side errors are surfaced to the user and leave the controller
//! ready for another attempt. Service-side errors are logged and swallowed
//! by the orchestrator; they only abort the background step they occur in.

use thiserror::Error;

/// Errors raised by the capture controllers and the device layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Photo capture attempted while a video recording is in progress
    #[error("Capture blocked while a recording is in progress")]
    Blocked,

    #[error("Operation not valid in state {0}")]
    InvalidState(String),
}

impl CaptureError {
    /// Whether the user can recover by retrying the capture step
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_) | CaptureError::DeviceUnavailable(_)
        )
    }
}

/// Errors raised by the remote service and notification collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Record write failed: {0}")]
    Write(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("URL resolution failed: {0}")]
    Url(String),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;
pub type ServiceResult<T> = Result<T, ServiceError>;
