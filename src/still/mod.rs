//! Document photo capture from the rear camera

mod controller;
mod image;

pub use controller::{StillCapture, StillState};
pub use image::{encode_png, StillImage};
