use super::types::SessionStatus;
use crate::events::{EventBus, ProctorEvent};
use crate::warning::{
    TerminationReason, ViolationEvent, ViolationKind, WarningEngine, WarningOutcome,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State of one proctoring run, shared by reference with both loops.
///
/// Cloning is cheap and every clone observes the same session.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    session_id: Uuid,
    candidate_id: String,
    created_at: DateTime<Utc>,
    engine: WarningEngine,
    event_bus: Arc<EventBus>,
    active: AtomicBool,
    // Held across the active check and the engine update, and by deactivate
    gate: Mutex<()>,
    cancel: CancellationToken,
    forced: Mutex<Option<TerminationReason>>,
    termination_tx: mpsc::UnboundedSender<TerminationReason>,
}

impl SessionContext {
    /// Create an active session. The receiver yields at most one reason,
    /// sent when the session is forcibly terminated.
    pub fn new(
        candidate_id: &str,
        event_bus: Arc<EventBus>,
    ) -> (Self, mpsc::UnboundedReceiver<TerminationReason>) {
        Self::with_engine(candidate_id, event_bus, WarningEngine::new())
    }

    pub(crate) fn with_engine(
        candidate_id: &str,
        event_bus: Arc<EventBus>,
        engine: WarningEngine,
    ) -> (Self, mpsc::UnboundedReceiver<TerminationReason>) {
        let (termination_tx, termination_rx) = mpsc::unbounded_channel();

        let context = Self {
            inner: Arc::new(ContextInner {
                session_id: Uuid::new_v4(),
                candidate_id: candidate_id.to_string(),
                created_at: Utc::now(),
                engine,
                event_bus,
                active: AtomicBool::new(true),
                gate: Mutex::new(()),
                cancel: CancellationToken::new(),
                forced: Mutex::new(None),
                termination_tx,
            }),
        };

        (context, termination_rx)
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn candidate_id(&self) -> &str {
        &self.inner.candidate_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn engine(&self) -> &WarningEngine {
        &self.inner.engine
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }

    /// Token both loops watch at their suspension points
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Reason the session was forcibly ended, if it was
    pub fn forced_termination(&self) -> Option<TerminationReason> {
        *self.inner.forced.lock()
    }

    /// Mark the session inactive and signal both loops.
    ///
    /// Returns true only for the call that flipped the flag.
    pub fn deactivate(&self) -> bool {
        let flipped = {
            let _gate = self.inner.gate.lock();
            self.flip_inactive()
        };
        self.inner.cancel.cancel();
        flipped
    }

    fn flip_inactive(&self) -> bool {
        self.inner
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Feed one violation to the warning engine and act on the outcome.
    ///
    /// Runs synchronously in the reporting loop, so that loop cannot move on
    /// before the violation has been counted and published.
    pub fn report_violation(&self, event: ViolationEvent) -> WarningOutcome {
        let _gate = self.inner.gate.lock();
        if !self.is_active() {
            debug!("Session inactive, dropping '{}'", event.kind);
            return WarningOutcome::Discarded;
        }

        let outcome = self.inner.engine.record(&event);
        match outcome {
            WarningOutcome::Warned { warning_count } => {
                self.publish_warning(warning_count, event.kind, event.timestamp);
            }
            WarningOutcome::Terminated {
                warning_count,
                reason,
            } => {
                if event.kind != ViolationKind::CameraFailure {
                    self.publish_warning(warning_count, event.kind, event.timestamp);
                }
                self.force_termination(reason);
            }
            WarningOutcome::Discarded => {}
        }

        outcome
    }

    fn publish_warning(&self, warning_count: u32, reason: ViolationKind, timestamp: SystemTime) {
        self.inner.event_bus.notify(ProctorEvent::WarningIssued {
            session_id: self.inner.session_id,
            warning_count,
            max_warnings: self.inner.engine.max_warnings(),
            reason,
            timestamp,
        });
    }

    /// Caller holds the gate
    fn force_termination(&self, reason: TerminationReason) {
        if !self.flip_inactive() {
            debug!("Session already inactive, ignoring termination ({})", reason);
            return;
        }

        // The reason must be readable before either loop or the supervisor
        // sees the cancellation
        *self.inner.forced.lock() = Some(reason);
        if self.inner.termination_tx.send(reason).is_err() {
            warn!("No supervisor listening for termination of {}", self.inner.session_id);
        }
        self.inner.cancel.cancel();

        info!(
            "Session {} for candidate {} terminated: {}",
            self.inner.session_id, self.inner.candidate_id, reason
        );
    }

    /// Point-in-time view of the session
    pub fn status(&self) -> SessionStatus {
        let snapshot = self.inner.engine.snapshot();
        SessionStatus {
            session_id: Some(self.inner.session_id),
            candidate_id: Some(self.inner.candidate_id.clone()),
            active: self.is_active(),
            warning_count: snapshot.warning_count,
            max_warnings: snapshot.max_warnings,
            state: snapshot.state,
            last_reason: snapshot.last_reason,
            termination_reason: self.forced_termination(),
            created_at: Some(self.inner.created_at),
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.inner.session_id)
            .field("candidate_id", &self.inner.candidate_id)
            .field("active", &self.is_active())
            .finish()
    }
}
