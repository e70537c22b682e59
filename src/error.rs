use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ProctorError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Camera acquisition failures. Fatal to the session that hits them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera {index} unavailable: {details}")]
    Unavailable { index: u32, details: String },

    #[error("Camera {index} read failed: {details}")]
    ReadFailure { index: u32, details: String },

    #[error("Camera {index} produced no frame within {timeout:?}")]
    Timeout { index: u32, timeout: Duration },

    #[error("Camera {index} is closed")]
    Closed { index: u32 },
}

impl CameraError {
    /// Device index the failure belongs to
    pub fn index(&self) -> u32 {
        match self {
            CameraError::Unavailable { index, .. }
            | CameraError::ReadFailure { index, .. }
            | CameraError::Timeout { index, .. }
            | CameraError::Closed { index } => *index,
        }
    }
}

/// Per-cycle detector failures, absorbed by the analysis loop
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("{detector} inference failed: {details}")]
    Inference {
        detector: &'static str,
        details: String,
    },

    #[error("Frame rejected by detector: {details}")]
    InvalidFrame { details: String },
}

/// Lifecycle errors reported back to the caller of the session controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("A session for candidate '{candidate_id}' is already active")]
    AlreadyActive { candidate_id: String },

    #[error("Session start failed: {0}")]
    StartFailed(#[source] CameraError),
}

/// Snapshot persistence failures. Logged, never fatal.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write snapshot {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot {key}: {details}")]
    Encode { key: String, details: String },

    #[error("Failed to create snapshot directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ProctorError>;
