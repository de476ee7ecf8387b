//! Video capture module
//!
//! V4L2 device discovery, the capture thread behind a camera stream, and the
//! JPEG encoder that turns a snapshot into a recognition payload.

pub mod capture;
pub mod device;
pub mod format;
pub mod frame;
pub mod jpeg;

pub use capture::V4l2Camera;
pub use device::{enumerate_devices, find_best_device, VideoDevice, VideoDeviceInfo};
pub use format::{PixelFormat, Resolution};
pub use frame::VideoFrame;
pub use jpeg::JpegEncoder;
