use crate::analyzer::AnalysisReport;
use crate::capture::CaptureReport;
use crate::warning::{TerminationReason, ViolationKind, WarningState, MAX_WARNINGS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Point-in-time view of the current (or most recent) session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: Option<Uuid>,
    pub candidate_id: Option<String>,
    pub active: bool,
    pub warning_count: u32,
    pub max_warnings: u32,
    pub state: WarningState,
    pub last_reason: Option<ViolationKind>,
    pub termination_reason: Option<TerminationReason>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    /// Status reported before any session has been started
    pub fn idle() -> Self {
        Self {
            session_id: None,
            candidate_id: None,
            active: false,
            warning_count: 0,
            max_warnings: MAX_WARNINGS,
            state: WarningState::Clean,
            last_reason: None,
            termination_reason: None,
            created_at: None,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stopped by the caller
    Stopped,
    /// Forcibly terminated and auto-submitted
    AutoSubmitted(TerminationReason),
}

/// What was left behind once a session's loops were reclaimed
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub candidate_id: String,
    pub outcome: SessionOutcome,
    pub warning_count: u32,
    /// None if the capture loop had to be aborted
    pub capture: Option<CaptureReport>,
    /// None if the analysis loop had to be aborted
    pub analysis: Option<AnalysisReport>,
}
