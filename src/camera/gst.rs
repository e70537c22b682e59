use super::source::{CameraDriver, FrameSource};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// V4L2 cameras through a GStreamer `v4l2src ! appsink` pipeline
#[derive(Debug, Clone, Default)]
pub struct GstCameraDriver;

impl GstCameraDriver {
    pub fn new() -> Self {
        Self
    }

    fn pipeline_description(index: u32, config: &CameraConfig) -> String {
        let (width, height) = config.resolution;
        format!(
            "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
             image/jpeg,width={},height={},framerate={}/1 ! \
             queue max-size-buffers=2 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            index, width, height, config.fps
        )
    }
}

impl CameraDriver for GstCameraDriver {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn open(
        &self,
        index: u32,
        config: &CameraConfig,
    ) -> Result<Box<dyn FrameSource>, CameraError> {
        let unavailable = |details: String| CameraError::Unavailable { index, details };

        gstreamer::init().map_err(|e| unavailable(format!("GStreamer init failed: {}", e)))?;

        let description = Self::pipeline_description(index, config);
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| unavailable(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| unavailable("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| unavailable("Pipeline has no appsink".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| unavailable("Failed to downcast to AppSink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| unavailable(format!("Failed to start pipeline: {}", e)))?;

        Ok(Box::new(GstCamera {
            index,
            pipeline,
            appsink,
            read_timeout_ms: config.read_timeout_ms,
            frame_counter: 0,
            closed: false,
        }))
    }
}

struct GstCamera {
    index: u32,
    pipeline: Pipeline,
    appsink: AppSink,
    read_timeout_ms: u64,
    frame_counter: u64,
    closed: bool,
}

#[async_trait]
impl FrameSource for GstCamera {
    fn index(&self) -> u32 {
        self.index
    }

    async fn read_frame(&mut self) -> Result<FrameData, CameraError> {
        let index = self.index;
        if self.closed {
            return Err(CameraError::Closed { index });
        }

        let appsink = self.appsink.clone();
        let timeout_ms = self.read_timeout_ms;

        // try_pull_sample blocks the calling thread
        let sample = tokio::task::spawn_blocking(move || {
            appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(timeout_ms))
        })
        .await
        .map_err(|e| CameraError::ReadFailure {
            index,
            details: format!("Sample task failed: {}", e),
        })?
        .ok_or_else(|| CameraError::ReadFailure {
            index,
            details: "Pipeline delivered no sample (EOS or timeout)".to_string(),
        })?;

        let read_failure = |details: &str| CameraError::ReadFailure {
            index,
            details: details.to_string(),
        };

        let (width, height) = sample
            .caps()
            .and_then(|caps| caps.structure(0))
            .map(|s| {
                (
                    s.get::<i32>("width").unwrap_or(0).max(0) as u32,
                    s.get::<i32>("height").unwrap_or(0).max(0) as u32,
                )
            })
            .ok_or_else(|| read_failure("No caps in sample"))?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| read_failure("No buffer in sample"))?;
        let map = buffer
            .map_readable()
            .map_err(|_| read_failure("Failed to map buffer"))?;

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        trace!(
            "Captured MJPEG frame {} from camera {} ({}x{}, {} bytes)",
            frame_id,
            index,
            width,
            height,
            map.len()
        );

        Ok(FrameData::new(
            frame_id,
            index,
            SystemTime::now(),
            map.as_slice().to_vec(),
            width,
            height,
            FrameFormat::Mjpeg,
        ))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop pipeline for camera {}: {}", self.index, e);
        }
        debug!("GStreamer camera {} closed", self.index);
    }
}
