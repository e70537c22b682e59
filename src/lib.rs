pub mod analyzer;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_slot;
pub mod session;
pub mod storage;
pub mod warning;

pub use analyzer::{
    AnalysisLoop, AnalysisReport, BodyPoseEstimator, CycleAnalyzer, DetectorSet,
    FaceGeometryTracker, PersonPresenceDetector, Scene, ScriptedScene,
};
pub use camera::{CameraDriver, CameraPool, FrameSource, MockCameraDriver, SyntheticCameraDriver};
pub use capture::{CaptureExit, CaptureLoop, CaptureReport, SnapshotCadence};
pub use config::ProctorConfig;
pub use error::{CameraError, DetectorError, ProctorError, Result, SessionError, StorageError};
pub use events::{EventBus, EventFilter, EventReceiver, ObserverPayload, ProctorEvent};
pub use frame::{FrameData, FrameFormat, FrameSet};
pub use frame_slot::LatestFrameSlot;
pub use session::{
    SessionController, SessionControllerBuilder, SessionOutcome, SessionStatus, SessionSummary,
};
pub use storage::{FsSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use warning::{
    TerminationReason, ViolationEvent, ViolationKind, WarningEngine, WarningOutcome,
    WarningState, MAX_WARNINGS,
};

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use camera::GstCameraDriver;
