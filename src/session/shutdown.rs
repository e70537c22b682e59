use super::context::SessionContext;
use super::controller::{ControllerInner, RunningSession, SessionController};
use super::types::{SessionOutcome, SessionSummary};
use crate::events::ProctorEvent;
use crate::warning::TerminationReason;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl SessionController {
    /// Watch for forced termination and run the stop-and-submit path.
    ///
    /// Runs as its own task because the loop that trips termination cannot
    /// wait for itself to finish.
    pub(super) fn spawn_supervisor(
        &self,
        context: SessionContext,
        mut termination_rx: mpsc::UnboundedReceiver<TerminationReason>,
    ) {
        let inner = Arc::clone(&self.inner);
        let session_id = context.session_id();

        tokio::spawn(async move {
            // force_termination records the reason before cancelling, so a
            // cancelled token with no reason is a voluntary stop
            let reason = tokio::select! {
                biased;
                reason = termination_rx.recv() => reason,
                _ = context.cancel_token().cancelled() => context.forced_termination(),
            };

            match reason {
                Some(reason) => {
                    warn!("Auto-submitting session {}: {}", session_id, reason);
                    inner.reap(session_id).await;
                }
                None => debug!("Session {} ended without forced termination", session_id),
            }
        });
    }
}

impl ControllerInner {
    /// Tear down `session_id` if it is still the running session
    pub(super) async fn reap(&self, session_id: Uuid) -> Option<SessionSummary> {
        let mut running = self.running.lock().await;

        let is_current = running
            .as_ref()
            .map(|session| session.context.session_id() == session_id)
            .unwrap_or(false);
        if !is_current {
            debug!("Session {} already reclaimed", session_id);
            return None;
        }

        let session = running.take()?;
        Some(self.finish(session).await)
    }

    /// Deactivate, wait for both loops, then emit the terminal notification.
    ///
    /// Every session passes through here exactly once, whoever gets to it
    /// first.
    pub(super) async fn finish(&self, session: RunningSession) -> SessionSummary {
        let RunningSession {
            context,
            capture,
            analysis,
        } = session;

        let session_id = context.session_id();
        info!("Stopping session {}", session_id);

        context.deactivate();

        let stop_timeout = self.config.system.stop_timeout();
        let capture = join_loop("capture", capture, stop_timeout).await;
        let analysis = join_loop("analysis", analysis, stop_timeout).await;

        let outcome = match context.forced_termination() {
            Some(reason) => {
                self.event_bus.notify(ProctorEvent::AutoSubmitted {
                    session_id,
                    reason,
                    message: reason.message().to_string(),
                    timestamp: SystemTime::now(),
                });
                SessionOutcome::AutoSubmitted(reason)
            }
            None => {
                self.event_bus.notify(ProctorEvent::SessionStopped {
                    session_id,
                    timestamp: SystemTime::now(),
                });
                SessionOutcome::Stopped
            }
        };

        let warning_count = context.engine().warning_count();
        info!(
            "Session {} for {} finished: {:?} with {} warnings",
            session_id,
            context.candidate_id(),
            outcome,
            warning_count
        );

        SessionSummary {
            session_id,
            candidate_id: context.candidate_id().to_string(),
            outcome,
            warning_count,
            capture,
            analysis,
        }
    }
}

/// Wait for a loop task, aborting it if it overruns `limit`
async fn join_loop<T>(name: &str, mut handle: JoinHandle<T>, limit: Duration) -> Option<T> {
    match timeout(limit, &mut handle).await {
        Ok(Ok(report)) => {
            debug!("{} loop stopped", name);
            Some(report)
        }
        Ok(Err(e)) => {
            error!("{} loop failed: {}", name, e);
            None
        }
        Err(_) => {
            error!("{} loop did not stop within {:?}, aborting", name, limit);
            handle.abort();
            // Dropping the aborted task releases anything it still owns
            if timeout(limit, handle).await.is_err() {
                error!("{} loop ignored abort", name);
            }
            None
        }
    }
}
