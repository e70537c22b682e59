use crate::error::EventBusError;
use crate::warning::{TerminationReason, ViolationKind};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events published by a proctoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProctorEvent {
    /// A session started monitoring a candidate
    SessionStarted {
        session_id: Uuid,
        candidate_id: String,
        timestamp: SystemTime,
    },
    /// The warning count changed
    WarningIssued {
        session_id: Uuid,
        warning_count: u32,
        max_warnings: u32,
        reason: ViolationKind,
        timestamp: SystemTime,
    },
    /// A periodic snapshot was persisted
    SnapshotSaved { key: String, timestamp: SystemTime },
    /// A periodic snapshot could not be persisted
    SnapshotFailed { key: String, error: String },
    /// A camera stopped delivering frames
    CameraFailed {
        index: u32,
        error: String,
        timestamp: SystemTime,
    },
    /// The session was stopped by its caller
    SessionStopped {
        session_id: Uuid,
        timestamp: SystemTime,
    },
    /// The session was terminated and the assessment auto-submitted
    AutoSubmitted {
        session_id: Uuid,
        reason: TerminationReason,
        message: String,
        timestamp: SystemTime,
    },
}

/// Wire payload pushed to a connected observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObserverPayload {
    AutoSubmitted {
        status: String,
        reason: TerminationReason,
        message: String,
    },
    WarningUpdate {
        warning_count: u32,
        max_warnings: u32,
    },
}

impl ProctorEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            ProctorEvent::SessionStarted { timestamp, .. } => *timestamp,
            ProctorEvent::WarningIssued { timestamp, .. } => *timestamp,
            ProctorEvent::SnapshotSaved { timestamp, .. } => *timestamp,
            ProctorEvent::SnapshotFailed { .. } => SystemTime::now(),
            ProctorEvent::CameraFailed { timestamp, .. } => *timestamp,
            ProctorEvent::SessionStopped { timestamp, .. } => *timestamp,
            ProctorEvent::AutoSubmitted { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ProctorEvent::SessionStarted { candidate_id, .. } => {
                format!("Session started for candidate {}", candidate_id)
            }
            ProctorEvent::WarningIssued {
                warning_count,
                max_warnings,
                reason,
                ..
            } => format!("Warning {}/{}: {}", warning_count, max_warnings, reason),
            ProctorEvent::SnapshotSaved { key, .. } => format!("Snapshot saved: {}", key),
            ProctorEvent::SnapshotFailed { key, error } => {
                format!("Snapshot {} failed: {}", key, error)
            }
            ProctorEvent::CameraFailed { index, error, .. } => {
                format!("Camera {} failed: {}", index, error)
            }
            ProctorEvent::SessionStopped { session_id, .. } => {
                format!("Session {} stopped", session_id)
            }
            ProctorEvent::AutoSubmitted { reason, .. } => {
                format!("Session auto-submitted: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ProctorEvent::SessionStarted { .. } => "session_started",
            ProctorEvent::WarningIssued { .. } => "warning_issued",
            ProctorEvent::SnapshotSaved { .. } => "snapshot_saved",
            ProctorEvent::SnapshotFailed { .. } => "snapshot_failed",
            ProctorEvent::CameraFailed { .. } => "camera_failed",
            ProctorEvent::SessionStopped { .. } => "session_stopped",
            ProctorEvent::AutoSubmitted { .. } => "auto_submitted",
        }
    }

    /// Observer-facing payload, for the events an observer is told about
    pub fn observer_payload(&self) -> Option<ObserverPayload> {
        match self {
            ProctorEvent::WarningIssued {
                warning_count,
                max_warnings,
                ..
            } => Some(ObserverPayload::WarningUpdate {
                warning_count: *warning_count,
                max_warnings: *max_warnings,
            }),
            ProctorEvent::AutoSubmitted {
                reason, message, ..
            } => Some(ObserverPayload::AutoSubmitted {
                status: "auto_submitted".to_string(),
                reason: *reason,
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// Async event bus for session notifications using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<ProctorEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ProctorEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ProctorEvent) -> Result<usize, EventBusError> {
        match &event {
            ProctorEvent::CameraFailed { index, error, .. } => {
                warn!("Camera {} failed: {}", index, error);
            }
            ProctorEvent::AutoSubmitted { reason, .. } => {
                warn!("Session auto-submitted: {}", reason);
            }
            ProctorEvent::SessionStarted { .. } | ProctorEvent::SessionStopped { .. } => {
                info!("{}", event.description());
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish, treating "nobody is listening" as success
    pub fn notify(&self, event: ProctorEvent) {
        if let Err(e) = self.publish(event) {
            debug!("Notification not delivered: {}", e);
        }
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Only events carrying an observer payload
    ObserverUpdates,
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ProctorEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::ObserverUpdates => event.observer_payload().is_some(),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ProctorEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<ProctorEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<ProctorEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<ProctorEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
