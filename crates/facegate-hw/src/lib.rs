//! facegate-hw — Hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access: device discovery, format negotiation
//! (YUYV/GREY), and single-frame grayscale capture.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
