use super::source::{CameraDriver, FrameSource};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, trace};

/// Driver producing RGB24 colour-bar frames at the configured rate
#[derive(Debug, Clone, Default)]
pub struct SyntheticCameraDriver;

impl SyntheticCameraDriver {
    pub fn new() -> Self {
        Self
    }
}

impl CameraDriver for SyntheticCameraDriver {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(
        &self,
        index: u32,
        config: &CameraConfig,
    ) -> Result<Box<dyn FrameSource>, CameraError> {
        if config.fps == 0 {
            return Err(CameraError::Unavailable {
                index,
                details: "fps must be greater than 0".to_string(),
            });
        }

        debug!(
            "Synthetic camera {} opened ({}x{} @ {}fps)",
            index, config.resolution.0, config.resolution.1, config.fps
        );

        Ok(Box::new(SyntheticCamera {
            index,
            resolution: config.resolution,
            frame_interval: Duration::from_millis(1000 / config.fps as u64),
            ticker: None,
            frame_counter: 0,
            closed: false,
        }))
    }
}

struct SyntheticCamera {
    index: u32,
    resolution: (u32, u32),
    frame_interval: Duration,
    // Created on first read so opening works outside a runtime
    ticker: Option<Interval>,
    frame_counter: u64,
    closed: bool,
}

#[async_trait]
impl FrameSource for SyntheticCamera {
    fn index(&self) -> u32 {
        self.index
    }

    async fn read_frame(&mut self) -> Result<FrameData, CameraError> {
        if self.closed {
            return Err(CameraError::Closed { index: self.index });
        }

        let frame_interval = self.frame_interval;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        ticker.tick().await;

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        let (width, height) = self.resolution;
        let data = colour_bars(width, height, frame_id as u32 + self.index * 17);

        trace!(
            "Generated synthetic frame {} for camera {} ({} bytes)",
            frame_id,
            self.index,
            data.len()
        );

        Ok(FrameData::new(
            frame_id,
            self.index,
            SystemTime::now(),
            data,
            width,
            height,
            FrameFormat::Rgb24,
        ))
    }

    fn close(&mut self) {
        self.closed = true;
        debug!("Synthetic camera {} closed", self.index);
    }
}

const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Eight vertical bars scrolled sideways by `offset` pixels
fn colour_bars(width: u32, height: u32, offset: u32) -> Vec<u8> {
    let width = width as usize;
    let bar_width = (width / BARS.len()).max(1);
    let mut row = Vec::with_capacity(width * 3);
    for x in 0..width {
        let column = (x + offset as usize) % width.max(1);
        row.extend_from_slice(&BARS[(column / bar_width).min(BARS.len() - 1)]);
    }

    row.repeat(height as usize)
}
