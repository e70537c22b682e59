use super::source::{CameraDriver, FrameSource};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

const MOCK_WIDTH: u32 = 8;
const MOCK_HEIGHT: u32 = 6;

#[derive(Debug, Default)]
struct MockState {
    opens: HashMap<u32, u32>,
    closes: HashMap<u32, u32>,
    fail_open: HashSet<u32>,
    fail_read_after: HashMap<u32, u64>,
    fail_read_now: HashSet<u32>,
    stall: HashSet<u32>,
}

/// Camera driver test double.
///
/// Counts opens and closes per device and lets tests inject open failures,
/// read failures and stalls. Clones share state.
#[derive(Debug, Clone)]
pub struct MockCameraDriver {
    state: Arc<Mutex<MockState>>,
    frame_interval: Duration,
}

impl MockCameraDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            frame_interval: Duration::from_millis(5),
        }
    }

    /// Delay each read by `interval`
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Make opening `index` fail
    pub fn fail_open(&self, index: u32) {
        self.state.lock().fail_open.insert(index);
    }

    /// Make `index` fail every read after delivering `frames` frames
    pub fn fail_read_after(&self, index: u32, frames: u64) {
        self.state.lock().fail_read_after.insert(index, frames);
    }

    /// Make the next and all later reads of `index` fail
    pub fn trigger_read_failure(&self, index: u32) {
        self.state.lock().fail_read_now.insert(index);
    }

    /// Make reads of `index` block until the driver's timeout fires
    pub fn stall(&self, index: u32) {
        self.state.lock().stall.insert(index);
    }

    pub fn open_count(&self, index: u32) -> u32 {
        self.state.lock().opens.get(&index).copied().unwrap_or(0)
    }

    pub fn close_count(&self, index: u32) -> u32 {
        self.state.lock().closes.get(&index).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> u32 {
        self.state.lock().opens.values().sum()
    }

    pub fn total_closes(&self) -> u32 {
        self.state.lock().closes.values().sum()
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> i64 {
        self.total_opens() as i64 - self.total_closes() as i64
    }
}

impl Default for MockCameraDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDriver for MockCameraDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(
        &self,
        index: u32,
        _config: &CameraConfig,
    ) -> Result<Box<dyn FrameSource>, CameraError> {
        let mut state = self.state.lock();
        if state.fail_open.contains(&index) {
            return Err(CameraError::Unavailable {
                index,
                details: "mock open failure".to_string(),
            });
        }

        *state.opens.entry(index).or_insert(0) += 1;
        debug!("Mock camera {} opened", index);

        Ok(Box::new(MockCamera {
            index,
            state: Arc::clone(&self.state),
            frame_interval: self.frame_interval,
            frames_read: 0,
        }))
    }
}

struct MockCamera {
    index: u32,
    state: Arc<Mutex<MockState>>,
    frame_interval: Duration,
    frames_read: u64,
}

#[async_trait]
impl FrameSource for MockCamera {
    fn index(&self) -> u32 {
        self.index
    }

    async fn read_frame(&mut self) -> Result<FrameData, CameraError> {
        let (fail, stall) = {
            let state = self.state.lock();
            let fail_after = state
                .fail_read_after
                .get(&self.index)
                .map(|limit| self.frames_read >= *limit)
                .unwrap_or(false);
            (
                fail_after || state.fail_read_now.contains(&self.index),
                state.stall.contains(&self.index),
            )
        };

        if fail {
            return Err(CameraError::ReadFailure {
                index: self.index,
                details: "mock read failure".to_string(),
            });
        }

        if stall {
            std::future::pending::<()>().await;
        }

        tokio::time::sleep(self.frame_interval).await;

        let frame_id = self.frames_read;
        self.frames_read += 1;

        let pixel = (frame_id % 256) as u8;
        let data = vec![pixel; (MOCK_WIDTH * MOCK_HEIGHT * 3) as usize];

        Ok(FrameData::new(
            frame_id,
            self.index,
            SystemTime::now(),
            data,
            MOCK_WIDTH,
            MOCK_HEIGHT,
            FrameFormat::Rgb24,
        ))
    }

    fn close(&mut self) {
        *self.state.lock().closes.entry(self.index).or_insert(0) += 1;
        debug!("Mock camera {} closed", self.index);
    }
}
