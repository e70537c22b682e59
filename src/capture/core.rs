use super::cadence::SnapshotCadence;
use crate::{
    camera::CameraPool,
    config::CaptureConfig,
    error::CameraError,
    events::ProctorEvent,
    frame::{FrameData, FrameSet},
    frame_slot::LatestFrameSlot,
    session::SessionContext,
    storage::{encode_snapshot, resolve_timezone, snapshot_key, SnapshotStore},
    warning::{ViolationEvent, ViolationKind},
};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Why the capture loop returned
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureExit {
    /// The session became inactive
    Cancelled,
    /// A camera failed and the session was terminated
    CameraFailure(CameraError),
}

/// Counters reported by a finished capture loop
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    pub exit: CaptureExit,
    pub frame_sets: u64,
    pub snapshots_saved: u64,
    pub snapshots_failed: u64,
    pub cameras_released: usize,
}

/// Reads synchronized frame sets from every camera, hands the newest one to
/// the analyzer and periodically persists a snapshot of the primary camera.
///
/// The loop owns the camera pool and always releases it before returning.
pub struct CaptureLoop {
    config: CaptureConfig,
    pool: CameraPool,
    slot: Arc<LatestFrameSlot>,
    store: Arc<dyn SnapshotStore>,
    context: SessionContext,
    timezone: Tz,
}

impl CaptureLoop {
    pub fn new(
        config: CaptureConfig,
        pool: CameraPool,
        slot: Arc<LatestFrameSlot>,
        store: Arc<dyn SnapshotStore>,
        context: SessionContext,
    ) -> Self {
        let timezone = resolve_timezone(&config.snapshot_timezone);
        Self {
            config,
            pool,
            slot,
            store,
            context,
            timezone,
        }
    }

    /// Run until the session becomes inactive or a camera fails
    pub async fn run(mut self) -> CaptureReport {
        info!(
            "Capture loop started for {} ({} cameras, snapshot every {:?})",
            self.context.candidate_id(),
            self.pool.len(),
            self.config.snapshot_interval()
        );

        let cancel = self.context.cancel_token().clone();
        let mut ticker = interval(self.config.cycle_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cadence = SnapshotCadence::new(self.config.snapshot_interval());
        let mut writes = JoinSet::new();
        let mut sequence = 0u64;
        let mut last_cycle = Instant::now();

        let exit = loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break CaptureExit::Cancelled,
                read = self.pool.read_all() => read,
            };

            match read {
                Ok(frames) => {
                    sequence += 1;
                    let set = FrameSet::new(sequence, SystemTime::now(), frames);
                    let captured_at = set.captured_at;
                    let primary = set.primary().cloned();
                    self.slot.publish(set);

                    let now = Instant::now();
                    let due = cadence.tick(now.duration_since(last_cycle));
                    last_cycle = now;

                    if due {
                        if let Some(frame) = primary {
                            self.spawn_snapshot(&mut writes, frame, captured_at);
                        }
                    }
                }
                Err(e) => {
                    self.handle_camera_failure(&e);
                    break CaptureExit::CameraFailure(e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break CaptureExit::Cancelled,
                _ = ticker.tick() => {}
            }
        };

        let cameras_released = self.pool.release();

        let mut snapshots_saved = 0;
        let mut snapshots_failed = 0;
        while let Some(result) = writes.join_next().await {
            match result {
                Ok(true) => snapshots_saved += 1,
                Ok(false) => snapshots_failed += 1,
                Err(e) => {
                    warn!("Snapshot task did not complete: {}", e);
                    snapshots_failed += 1;
                }
            }
        }

        info!(
            "Capture loop stopped after {} frame sets ({:?}), {} snapshots saved",
            sequence, exit, snapshots_saved
        );

        CaptureReport {
            exit,
            frame_sets: sequence,
            snapshots_saved,
            snapshots_failed,
            cameras_released,
        }
    }

    fn spawn_snapshot(&self, writes: &mut JoinSet<bool>, frame: FrameData, captured_at: SystemTime) {
        let key = snapshot_key(self.context.candidate_id(), captured_at, &self.timezone);
        let store = Arc::clone(&self.store);
        let event_bus = Arc::clone(self.context.event_bus());
        let quality = self.config.jpeg_quality;

        debug!("Snapshot due, writing {}", key);

        writes.spawn(async move {
            let stored = match encode_snapshot(&frame, &key, quality) {
                Ok(bytes) => store.put(&key, bytes).await,
                Err(e) => Err(e),
            };

            match stored {
                Ok(()) => {
                    info!("Saved snapshot {}", key);
                    event_bus.notify(ProctorEvent::SnapshotSaved {
                        key,
                        timestamp: captured_at,
                    });
                    true
                }
                Err(e) => {
                    warn!("Snapshot {} not saved: {}", key, e);
                    event_bus.notify(ProctorEvent::SnapshotFailed {
                        key,
                        error: e.to_string(),
                    });
                    false
                }
            }
        });
    }

    fn handle_camera_failure(&self, error: &CameraError) {
        error!("Camera {} failed: {}", error.index(), error);

        let timestamp = SystemTime::now();
        self.context
            .event_bus()
            .notify(ProctorEvent::CameraFailed {
                index: error.index(),
                error: error.to_string(),
                timestamp,
            });

        self.context
            .report_violation(ViolationEvent::new(ViolationKind::CameraFailure, timestamp));
    }
}
