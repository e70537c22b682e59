use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Warnings a session may accumulate; the one that reaches it ends the session
pub const MAX_WARNINGS: u32 = 3;

/// Kind of integrity violation observed during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    MultipleFaces,
    ExcessiveMovement,
    SuspiciousPose,
    CameraFailure,
}

impl ViolationKind {
    /// Message shown to the candidate for this violation
    pub fn description(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No face detected",
            ViolationKind::MultipleFaces => "Multiple people detected",
            ViolationKind::ExcessiveMovement => "Excessive head movement detected",
            ViolationKind::SuspiciousPose => "Suspicious pose detected",
            ViolationKind::CameraFailure => "Camera failure",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A violation together with the timestamp of the cycle that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub timestamp: SystemTime,
}

impl ViolationEvent {
    pub fn new(kind: ViolationKind, timestamp: SystemTime) -> Self {
        Self { kind, timestamp }
    }
}

/// Why a session was forcibly ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    WarningThresholdExceeded,
    CameraFailure,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::WarningThresholdExceeded => "warning_threshold_exceeded",
            TerminationReason::CameraFailure => "camera_failure",
        }
    }

    /// Candidate-facing message sent with the auto-submit notification
    pub fn message(&self) -> &'static str {
        match self {
            TerminationReason::WarningThresholdExceeded => {
                "Test auto-submitted due to multiple violations. Please contact test admin."
            }
            TerminationReason::CameraFailure => {
                "Test auto-submitted due to camera failure. Please contact test admin."
            }
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the warning accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WarningState {
    Clean,
    Warned { count: u32 },
    Terminated { reason: TerminationReason },
}

/// Result of feeding one violation into the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningOutcome {
    /// Count rose below the threshold
    Warned { warning_count: u32 },
    /// This violation terminated the session
    Terminated {
        warning_count: u32,
        reason: TerminationReason,
    },
    /// Session was already terminated; violation discarded
    Discarded,
}

/// Read-only view of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningSnapshot {
    pub state: WarningState,
    pub warning_count: u32,
    pub max_warnings: u32,
    pub last_reason: Option<ViolationKind>,
}

#[derive(Debug)]
struct EngineInner {
    state: WarningState,
    count: u32,
    last_reason: Option<ViolationKind>,
}

/// Maps violation events to a warning count and decides when a session ends.
///
/// Count only moves up. There is no decay. The recorded reason is kept for
/// observability and never influences transitions.
#[derive(Debug)]
pub struct WarningEngine {
    inner: Mutex<EngineInner>,
    max_warnings: u32,
}

impl WarningEngine {
    pub fn new() -> Self {
        Self::with_threshold(MAX_WARNINGS)
    }

    pub(crate) fn with_threshold(max_warnings: u32) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                state: WarningState::Clean,
                count: 0,
                last_reason: None,
            }),
            max_warnings: max_warnings.max(1),
        }
    }

    /// Apply one violation
    pub fn record(&self, event: &ViolationEvent) -> WarningOutcome {
        if event.kind == ViolationKind::CameraFailure {
            return self.terminate_with(TerminationReason::CameraFailure, Some(event.kind));
        }

        let mut inner = self.inner.lock();
        if let WarningState::Terminated { .. } = inner.state {
            debug!("Discarding '{}' after termination", event.kind);
            return WarningOutcome::Discarded;
        }

        inner.count += 1;
        inner.last_reason = Some(event.kind);
        let warning_count = inner.count;

        if warning_count >= self.max_warnings {
            let reason = TerminationReason::WarningThresholdExceeded;
            inner.state = WarningState::Terminated { reason };
            warn!(
                "Warning {}/{} ({}): threshold reached",
                warning_count, self.max_warnings, event.kind
            );
            WarningOutcome::Terminated {
                warning_count,
                reason,
            }
        } else {
            inner.state = WarningState::Warned {
                count: warning_count,
            };
            info!(
                "Warning {}/{}: {}",
                warning_count, self.max_warnings, event.kind
            );
            WarningOutcome::Warned { warning_count }
        }
    }

    /// Force termination without touching the count.
    ///
    /// Returns `Terminated` only for the call that performed the transition.
    pub fn terminate(&self, reason: TerminationReason) -> WarningOutcome {
        self.terminate_with(reason, None)
    }

    fn terminate_with(
        &self,
        reason: TerminationReason,
        last_reason: Option<ViolationKind>,
    ) -> WarningOutcome {
        let mut inner = self.inner.lock();
        if let WarningState::Terminated { .. } = inner.state {
            return WarningOutcome::Discarded;
        }

        inner.state = WarningState::Terminated { reason };
        if last_reason.is_some() {
            inner.last_reason = last_reason;
        }
        warn!("Session terminated: {}", reason);

        WarningOutcome::Terminated {
            warning_count: inner.count,
            reason,
        }
    }

    pub fn snapshot(&self) -> WarningSnapshot {
        let inner = self.inner.lock();
        WarningSnapshot {
            state: inner.state,
            warning_count: inner.count,
            max_warnings: self.max_warnings,
            last_reason: inner.last_reason,
        }
    }

    pub fn warning_count(&self) -> u32 {
        self.inner.lock().count
    }

    pub fn max_warnings(&self) -> u32 {
        self.max_warnings
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.inner.lock().state, WarningState::Terminated { .. })
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self.inner.lock().state {
            WarningState::Terminated { reason } => Some(reason),
            _ => None,
        }
    }
}

impl Default for WarningEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_COUNTED: [ViolationKind; 4] = [
        ViolationKind::NoFace,
        ViolationKind::MultipleFaces,
        ViolationKind::ExcessiveMovement,
        ViolationKind::SuspiciousPose,
    ];

    fn violation(kind: ViolationKind) -> ViolationEvent {
        ViolationEvent::new(kind, SystemTime::now())
    }

    #[test]
    fn test_starts_clean() {
        let engine = WarningEngine::new();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.state, WarningState::Clean);
        assert_eq!(snapshot.warning_count, 0);
        assert_eq!(snapshot.max_warnings, MAX_WARNINGS);
        assert!(snapshot.last_reason.is_none());
    }

    #[test]
    fn test_terminates_exactly_at_threshold() {
        // Every ordering of reasons gives the same count-driven transitions
        for first in ALL_COUNTED {
            for second in ALL_COUNTED {
                for third in ALL_COUNTED {
                    let engine = WarningEngine::new();

                    assert_eq!(
                        engine.record(&violation(first)),
                        WarningOutcome::Warned { warning_count: 1 }
                    );
                    assert_eq!(engine.snapshot().state, WarningState::Warned { count: 1 });

                    assert_eq!(
                        engine.record(&violation(second)),
                        WarningOutcome::Warned { warning_count: 2 }
                    );
                    assert!(!engine.is_terminated());

                    assert_eq!(
                        engine.record(&violation(third)),
                        WarningOutcome::Terminated {
                            warning_count: 3,
                            reason: TerminationReason::WarningThresholdExceeded,
                        }
                    );
                    assert_eq!(engine.snapshot().last_reason, Some(third));
                }
            }
        }
    }

    #[test]
    fn test_events_after_termination_are_discarded() {
        let engine = WarningEngine::new();
        for _ in 0..MAX_WARNINGS {
            engine.record(&violation(ViolationKind::NoFace));
        }

        assert_eq!(
            engine.record(&violation(ViolationKind::MultipleFaces)),
            WarningOutcome::Discarded
        );
        assert_eq!(engine.warning_count(), MAX_WARNINGS);
        assert_eq!(
            engine.termination_reason(),
            Some(TerminationReason::WarningThresholdExceeded)
        );
    }

    #[test]
    fn test_count_matches_events_below_threshold() {
        for n in 0..MAX_WARNINGS {
            let engine = WarningEngine::new();
            for _ in 0..n {
                engine.record(&violation(ViolationKind::SuspiciousPose));
            }
            assert_eq!(engine.warning_count(), n);
            assert!(!engine.is_terminated());
        }
    }

    #[test]
    fn test_camera_failure_terminates_below_threshold() {
        let engine = WarningEngine::new();
        engine.record(&violation(ViolationKind::MultipleFaces));

        let outcome = engine.record(&violation(ViolationKind::CameraFailure));
        assert_eq!(
            outcome,
            WarningOutcome::Terminated {
                warning_count: 1,
                reason: TerminationReason::CameraFailure,
            }
        );
        assert_eq!(
            engine.snapshot().state,
            WarningState::Terminated {
                reason: TerminationReason::CameraFailure
            }
        );
        assert_eq!(engine.snapshot().last_reason, Some(ViolationKind::CameraFailure));
    }

    #[test]
    fn test_terminate_transitions_once() {
        let engine = WarningEngine::new();
        assert!(matches!(
            engine.terminate(TerminationReason::CameraFailure),
            WarningOutcome::Terminated { .. }
        ));
        assert_eq!(
            engine.terminate(TerminationReason::WarningThresholdExceeded),
            WarningOutcome::Discarded
        );
        assert_eq!(
            engine.termination_reason(),
            Some(TerminationReason::CameraFailure)
        );
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(
            TerminationReason::WarningThresholdExceeded.as_str(),
            "warning_threshold_exceeded"
        );
        assert_eq!(TerminationReason::CameraFailure.as_str(), "camera_failure");
        assert_eq!(
            serde_json::to_string(&TerminationReason::CameraFailure).unwrap(),
            "\"camera_failure\""
        );
        assert_eq!(ViolationKind::NoFace.to_string(), "No face detected");
    }
}
