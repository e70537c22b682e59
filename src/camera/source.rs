use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;

/// One open camera handle producing an ordered sequence of frames
#[async_trait]
pub trait FrameSource: Send {
    /// Device index this handle was opened for
    fn index(&self) -> u32;

    /// Wait for the next frame from the device
    async fn read_frame(&mut self) -> Result<FrameData, CameraError>;

    /// Release the device. Called exactly once by the owning pool.
    fn close(&mut self);
}

/// Camera driver binding able to open devices by index
pub trait CameraDriver: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, index: u32, config: &CameraConfig)
        -> Result<Box<dyn FrameSource>, CameraError>;
}
