use super::source::{CameraDriver, FrameSource};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::FrameData;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Exclusive owner of every camera handle of one session.
///
/// Acquisition is all-or-nothing, and every acquired handle is closed exactly
/// once: by [`CameraPool::release`] or, failing that, when the pool drops.
pub struct CameraPool {
    sources: Vec<Box<dyn FrameSource>>,
    read_timeout: Duration,
}

impl CameraPool {
    /// Open every camera listed by `config`
    pub fn open(driver: &dyn CameraDriver, config: &CameraConfig) -> Result<Self, CameraError> {
        let indices = config.device_indices();
        Self::open_indices(driver, &indices, config)
    }

    /// Open the given device indices, in order.
    ///
    /// If any device fails, the ones already opened are closed again and the
    /// failure is returned as [`CameraError::Unavailable`].
    pub fn open_indices(
        driver: &dyn CameraDriver,
        indices: &[u32],
        config: &CameraConfig,
    ) -> Result<Self, CameraError> {
        if indices.is_empty() {
            return Err(CameraError::Unavailable {
                index: 0,
                details: "no camera indices requested".to_string(),
            });
        }

        info!(
            "Opening {} cameras {:?} via {} driver",
            indices.len(),
            indices,
            driver.name()
        );

        let mut pool = Self {
            sources: Vec::with_capacity(indices.len()),
            read_timeout: config.read_timeout(),
        };

        for &index in indices {
            match driver.open(index, config) {
                Ok(source) => {
                    debug!("Camera {} opened", index);
                    pool.sources.push(source);
                }
                Err(e) => {
                    error!("Camera {} failed to open: {}", index, e);
                    pool.release();
                    return Err(match e {
                        CameraError::Unavailable { .. } => e,
                        other => CameraError::Unavailable {
                            index,
                            details: other.to_string(),
                        },
                    });
                }
            }
        }

        Ok(pool)
    }

    /// Read one frame from every camera in pool order.
    ///
    /// Each read is bounded by the configured timeout. The first failing
    /// camera aborts the whole read.
    pub async fn read_all(&mut self) -> Result<Vec<FrameData>, CameraError> {
        if self.sources.is_empty() {
            return Err(CameraError::Closed { index: 0 });
        }

        let mut frames = Vec::with_capacity(self.sources.len());
        for source in self.sources.iter_mut() {
            let index = source.index();
            let frame = match timeout(self.read_timeout, source.read_frame()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(CameraError::Timeout {
                        index,
                        timeout: self.read_timeout,
                    })
                }
            };
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Close every handle. Returns how many were closed by this call.
    pub fn release(&mut self) -> usize {
        let released = self.sources.len();
        if released == 0 {
            return 0;
        }

        for mut source in self.sources.drain(..) {
            debug!("Releasing camera {}", source.index());
            source.close();
        }

        info!("Released {} camera handles", released);
        released
    }

    /// Device indices currently held, in pool order
    pub fn indices(&self) -> Vec<u32> {
        self.sources.iter().map(|s| s.index()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Drop for CameraPool {
    fn drop(&mut self) {
        if !self.sources.is_empty() {
            warn!(
                "Camera pool dropped with {} open handles, releasing",
                self.sources.len()
            );
            self.release();
        }
    }
}
