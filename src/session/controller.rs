use super::context::SessionContext;
use super::types::{SessionStatus, SessionSummary};
use crate::analyzer::{AnalysisLoop, AnalysisReport, DetectorSet};
use crate::camera::{CameraDriver, CameraPool};
use crate::capture::{CaptureLoop, CaptureReport};
use crate::config::ProctorConfig;
use crate::error::{ProctorError, Result, SessionError};
use crate::events::{EventBus, EventFilter, EventReceiver, ProctorEvent};
use crate::frame_slot::LatestFrameSlot;
use crate::storage::{FsSnapshotStore, SnapshotStore};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Produces a fresh detector set for every started session
pub type DetectorFactory = Arc<dyn Fn() -> DetectorSet + Send + Sync>;

/// Entry point for running proctoring sessions.
///
/// At most one session runs at a time. Cloning yields another handle to the
/// same controller.
#[derive(Clone)]
pub struct SessionController {
    pub(super) inner: Arc<ControllerInner>,
}

pub(super) struct ControllerInner {
    pub(super) config: ProctorConfig,
    driver: Arc<dyn CameraDriver>,
    detectors: DetectorFactory,
    store: Arc<dyn SnapshotStore>,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) running: tokio::sync::Mutex<Option<RunningSession>>,
    current: parking_lot::Mutex<Option<SessionContext>>,
}

/// Loops of the session currently holding the cameras
pub(super) struct RunningSession {
    pub(super) context: SessionContext,
    pub(super) capture: JoinHandle<CaptureReport>,
    pub(super) analysis: JoinHandle<AnalysisReport>,
}

impl SessionController {
    pub fn new(
        config: ProctorConfig,
        driver: Arc<dyn CameraDriver>,
        detectors: DetectorFactory,
        store: Arc<dyn SnapshotStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                driver,
                detectors,
                store,
                event_bus,
                running: tokio::sync::Mutex::new(None),
                current: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::new()
    }

    pub fn config(&self) -> &ProctorConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.inner.event_bus)
    }

    /// Receiver for the updates a connected observer is shown
    pub fn subscribe(&self) -> EventReceiver {
        self.inner
            .event_bus
            .subscribe_filtered(EventFilter::ObserverUpdates, "observer")
    }

    /// Start monitoring `candidate_id`.
    ///
    /// Opens every camera before anything else happens; if one is missing
    /// nothing is left open and no session exists afterwards.
    pub async fn start(&self, candidate_id: &str) -> std::result::Result<Uuid, SessionError> {
        let mut running = self.inner.running.lock().await;

        if let Some(existing) = running.as_ref() {
            if existing.context.is_active() {
                warn!(
                    "Refusing to start session for {}: {} is still being monitored",
                    candidate_id,
                    existing.context.candidate_id()
                );
                return Err(SessionError::AlreadyActive {
                    candidate_id: existing.context.candidate_id().to_string(),
                });
            }
        }

        // A terminated session whose supervisor has not reclaimed it yet
        if let Some(stale) = running.take() {
            self.inner.finish(stale).await;
        }

        let pool = CameraPool::open(self.inner.driver.as_ref(), &self.inner.config.camera)
            .map_err(|e| {
                error!("Cannot start session for {}: {}", candidate_id, e);
                SessionError::StartFailed(e)
            })?;

        let (context, termination_rx) =
            SessionContext::new(candidate_id, Arc::clone(&self.inner.event_bus));
        let session_id = context.session_id();

        info!(
            "Starting session {} for candidate {} with {} cameras ({})",
            session_id,
            candidate_id,
            pool.len(),
            self.inner.driver.name()
        );

        self.inner.event_bus.notify(ProctorEvent::SessionStarted {
            session_id,
            candidate_id: candidate_id.to_string(),
            timestamp: SystemTime::now(),
        });

        let slot = Arc::new(LatestFrameSlot::new());
        let capture = CaptureLoop::new(
            self.inner.config.capture.clone(),
            pool,
            Arc::clone(&slot),
            Arc::clone(&self.inner.store),
            context.clone(),
        );
        let analysis = AnalysisLoop::new(
            self.inner.config.analyzer.clone(),
            slot,
            (self.inner.detectors)(),
            context.clone(),
        );

        *running = Some(RunningSession {
            context: context.clone(),
            capture: tokio::spawn(capture.run()),
            analysis: tokio::spawn(analysis.run()),
        });
        *self.inner.current.lock() = Some(context.clone());

        self.spawn_supervisor(context, termination_rx);

        Ok(session_id)
    }

    /// Stop the running session and wait until its cameras are released.
    ///
    /// Returns `None` when there was nothing to stop.
    pub async fn stop(&self) -> Option<SessionSummary> {
        let session = self.inner.running.lock().await.take();
        match session {
            Some(session) => Some(self.inner.finish(session).await),
            None => {
                info!("Stop requested with no running session");
                None
            }
        }
    }

    /// Warning count, threshold and active flag of the current (or most
    /// recent) session
    pub fn status(&self) -> SessionStatus {
        self.inner
            .current
            .lock()
            .as_ref()
            .map(SessionContext::status)
            .unwrap_or_else(SessionStatus::idle)
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .current
            .lock()
            .as_ref()
            .map(SessionContext::is_active)
            .unwrap_or(false)
    }
}

/// Builder for SessionController
pub struct SessionControllerBuilder {
    config: Option<ProctorConfig>,
    driver: Option<Arc<dyn CameraDriver>>,
    detectors: Option<DetectorFactory>,
    store: Option<Arc<dyn SnapshotStore>>,
    event_bus: Option<Arc<EventBus>>,
}

impl SessionControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            driver: None,
            detectors: None,
            store: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: ProctorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the camera backend
    pub fn driver(mut self, driver: Arc<dyn CameraDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the detector backend
    pub fn detectors<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> DetectorSet + Send + Sync + 'static,
    {
        self.detectors = Some(Arc::new(factory));
        self
    }

    /// Set the snapshot store. Defaults to the configured snapshot directory.
    pub fn store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the event bus. Defaults to a new bus of the configured capacity.
    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<SessionController> {
        let config = self.config.ok_or_else(|| {
            ProctorError::component("session_controller_builder", "Config is required")
        })?;

        let driver = self.driver.ok_or_else(|| {
            ProctorError::component("session_controller_builder", "Camera driver is required")
        })?;

        let detectors = self.detectors.ok_or_else(|| {
            ProctorError::component("session_controller_builder", "Detectors are required")
        })?;

        let store = self.store.unwrap_or_else(|| {
            Arc::new(FsSnapshotStore::new(&config.capture.snapshot_path))
        });

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new(config.system.event_bus_capacity)));

        Ok(SessionController::new(
            config, driver, detectors, store, event_bus,
        ))
    }
}

impl Default for SessionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
