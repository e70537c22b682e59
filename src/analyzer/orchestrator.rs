use super::cycle::{CycleAnalyzer, CycleFindings};
use super::detectors::DetectorSet;
use crate::config::AnalyzerConfig;
use crate::frame::FrameSet;
use crate::frame_slot::LatestFrameSlot;
use crate::session::SessionContext;
use crate::warning::{ViolationEvent, WarningOutcome};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

/// Counters reported by a finished analysis loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub frames_analyzed: u64,
    pub violations: u64,
    pub detector_errors: u64,
    /// The loop's own violation ended the session
    pub terminated_session: bool,
}

/// Detector state moved onto the blocking pool for each cycle
struct Workbench {
    analyzer: CycleAnalyzer,
    detectors: DetectorSet,
}

/// Runs the detectors on the newest frame set and feeds violations to the
/// session's warning engine.
pub struct AnalysisLoop {
    config: AnalyzerConfig,
    slot: Arc<LatestFrameSlot>,
    workbench: Workbench,
    context: SessionContext,
}

/// How a processed frame set left the session
enum Step {
    Continue,
    SessionEnded,
}

impl AnalysisLoop {
    pub fn new(
        config: AnalyzerConfig,
        slot: Arc<LatestFrameSlot>,
        detectors: DetectorSet,
        context: SessionContext,
    ) -> Self {
        let analyzer = CycleAnalyzer::new(config.clone());
        Self {
            config,
            slot,
            workbench: Workbench {
                analyzer,
                detectors,
            },
            context,
        }
    }

    /// Run until the session becomes inactive
    pub async fn run(self) -> AnalysisReport {
        let Self {
            config,
            slot,
            workbench,
            context,
        } = self;

        info!(
            "Analysis loop started for {} (cycle {:?})",
            context.candidate_id(),
            config.cycle_interval()
        );

        let cancel = context.cancel_token().clone();
        let mut report = AnalysisReport::default();
        let mut last_sequence = 0u64;
        let mut workbench = Some(workbench);

        loop {
            if !context.is_active() {
                break;
            }

            if let Some(set) = slot.latest() {
                if set.sequence != last_sequence {
                    last_sequence = set.sequence;

                    let Some(bench) = workbench.take() else {
                        break;
                    };
                    let (bench, findings) = match analyze_blocking(bench, Arc::clone(&set)).await {
                        Some(result) => result,
                        None => break,
                    };
                    workbench = Some(bench);

                    if let Step::SessionEnded =
                        forward_findings(&context, &set, findings, &mut report)
                    {
                        break;
                    }
                } else {
                    trace!("Frame set {} already analysed", set.sequence);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(config.cycle_interval()) => {}
            }
        }

        info!(
            "Analysis loop stopped after {} frame sets, {} violations",
            report.frames_analyzed, report.violations
        );
        report
    }
}

/// Run the detectors for one frame set off the async workers.
///
/// Returns `None` if the detector task panicked; its state is lost with it.
async fn analyze_blocking(
    mut bench: Workbench,
    set: Arc<FrameSet>,
) -> Option<(Workbench, Option<CycleFindings>)> {
    let result = tokio::task::spawn_blocking(move || {
        let findings = set
            .primary()
            .map(|primary| bench.analyzer.analyze(primary, &mut bench.detectors));
        (bench, findings)
    })
    .await;

    match result {
        Ok(result) => Some(result),
        Err(e) => {
            error!("Detector task failed: {}", e);
            None
        }
    }
}

/// Hand one cycle's violations to the warning engine, in detection order
fn forward_findings(
    context: &SessionContext,
    set: &FrameSet,
    findings: Option<CycleFindings>,
    report: &mut AnalysisReport,
) -> Step {
    let Some(CycleFindings {
        violations,
        detector_errors,
        ..
    }) = findings
    else {
        warn!("Frame set {} has no frames", set.sequence);
        return Step::Continue;
    };

    let timestamp = SystemTime::now();
    report.frames_analyzed += 1;
    report.detector_errors += detector_errors.len() as u64;

    for kind in violations {
        report.violations += 1;
        debug!("Frame set {}: {}", set.sequence, kind.description());

        match context.report_violation(ViolationEvent::new(kind, timestamp)) {
            WarningOutcome::Warned { .. } => {}
            WarningOutcome::Terminated { .. } => {
                report.terminated_session = true;
                return Step::SessionEnded;
            }
            WarningOutcome::Discarded => return Step::SessionEnded,
        }
    }

    Step::Continue
}
