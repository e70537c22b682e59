mod mock;
mod pool;
mod source;
mod synthetic;

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod gst;


pub use mock::MockCameraDriver;
pub use pool::CameraPool;
pub use source::{CameraDriver, FrameSource};
pub use synthetic::SyntheticCameraDriver;

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use gst::GstCameraDriver;
