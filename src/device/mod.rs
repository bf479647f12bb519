pub mod backend;
pub mod session;
pub mod synthetic;

pub use backend::{
    AcquiredStream, DeviceBackend, DeviceConfig, DeviceKind, HardwareTracks, MediaFrame, Track,
};
pub use session::{DeviceSession, MediaDevices};
pub use synthetic::{SyntheticBehavior, SyntheticCamera};
