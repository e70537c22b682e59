use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Frame format enumeration supporting different video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// YUV 4:2:2 format - uncompressed YUV data
    Yuyv,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Yuyv => 2,
            FrameFormat::Rgb24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// One image from one camera
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Per-camera frame counter
    pub id: u64,
    /// Device index of the camera that produced the frame
    pub camera_index: u32,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        camera_index: u32,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            camera_index,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => !self.data.is_empty(),
        }
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Latest frame from every camera of a session, published as one unit.
///
/// `frames` is ordered by camera ordinal; index 0 is the primary camera.
#[derive(Debug, Clone)]
pub struct FrameSet {
    /// Monotonic publication counter assigned by the capture loop
    pub sequence: u64,
    pub captured_at: SystemTime,
    pub frames: Vec<FrameData>,
}

impl FrameSet {
    pub fn new(sequence: u64, captured_at: SystemTime, frames: Vec<FrameData>) -> Self {
        Self {
            sequence,
            captured_at,
            frames,
        }
    }

    /// Frame of the primary camera
    pub fn primary(&self) -> Option<&FrameData> {
        self.frames.first()
    }

    pub fn camera_count(&self) -> usize {
        self.frames.len()
    }
}
