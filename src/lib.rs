pub mod config;
pub mod demo;
pub mod device;
pub mod error;
pub mod host;
pub mod http;
pub mod notify;
pub mod recording;
pub mod remote;
pub mod review;
pub mod still;
pub mod submission;

pub use config::Config;
pub use device::{DeviceBackend, DeviceConfig, DeviceKind, DeviceSession, MediaDevices};
pub use error::{CaptureError, CaptureResult, ServiceError, ServiceResult};
pub use host::{HostContext, HostShell, Locale};
pub use http::{create_router, AppState};
pub use notify::{Notification, Notifier};
pub use recording::{RecorderConfig, RecorderState, TimedRecorder, VideoSegment};
pub use remote::{InMemoryService, RestService};
pub use review::{group_by_subject, normalize_row, NormalizedRow};
pub use still::{StillCapture, StillImage, StillState};
pub use submission::{
    Collaborators, Step, SubmissionConfig, SubmissionOrchestrator, SubmissionStatus, UploadPhase,
};
