use super::*;
use crate::config::AnalyzerConfig;
use crate::error::DetectorError;
use crate::events::EventBus;
use crate::frame::{FrameData, FrameFormat, FrameSet};
use crate::frame_slot::LatestFrameSlot;
use crate::session::SessionContext;
use crate::warning::{TerminationReason, ViolationKind, MAX_WARNINGS};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::time::{sleep, timeout};

fn create_test_analyzer_config(cycle_interval_ms: u64) -> AnalyzerConfig {
    AnalyzerConfig {
        cycle_interval_ms,
        movement_threshold: 0.1,
        head_rotation_threshold: 0.3,
        gaze_down_threshold: 0.7,
    }
}

fn create_test_frame(id: u64) -> FrameData {
    FrameData::new(
        id,
        0,
        SystemTime::now(),
        vec![0u8; 8 * 6 * 3],
        8,
        6,
        FrameFormat::Rgb24,
    )
}

fn create_test_frame_set(sequence: u64) -> FrameSet {
    FrameSet::new(
        sequence,
        SystemTime::now(),
        vec![create_test_frame(sequence), create_test_frame(sequence)],
    )
}

fn analyze(analyzer: &mut CycleAnalyzer, scene: &ScriptedScene, id: u64) -> CycleFindings {
    let mut detectors = scene.detectors();
    analyzer.analyze(&create_test_frame(id), &mut detectors)
}

#[test]
fn test_calm_scene_has_no_violations() {
    let scene = ScriptedScene::calm();
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));

    for id in 0..5 {
        let findings = analyze(&mut analyzer, &scene, id);
        assert!(findings.violations.is_empty());
        assert_eq!(findings.people, Some(1));
    }
    assert_eq!(analyzer.previous_landmarks(), Some(&centred_face()));
}

#[test]
fn test_empty_frame_emits_single_no_face() {
    let scene = ScriptedScene::calm();
    scene.set_people(0);
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));

    let findings = analyze(&mut analyzer, &scene, 0);
    assert_eq!(findings.violations, vec![ViolationKind::NoFace]);
    // Face geometry is only tracked for a single person
    assert!(analyzer.previous_landmarks().is_none());
}

#[test]
fn test_second_person_emits_multiple_faces() {
    let scene = ScriptedScene::calm();
    scene.set_people(2);
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));

    let findings = analyze(&mut analyzer, &scene, 0);
    assert_eq!(findings.violations, vec![ViolationKind::MultipleFaces]);
    assert_eq!(findings.people, Some(2));
}

#[test]
fn test_movement_threshold_boundary() {
    let scene = ScriptedScene::calm();
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));
    assert!(analyze(&mut analyzer, &scene, 0).violations.is_empty());

    scene.move_face(0.1 - 1e-3, 0.0);
    assert!(analyze(&mut analyzer, &scene, 1).violations.is_empty());

    scene.move_face(-(0.1 + 1e-3), 0.0);
    assert_eq!(
        analyze(&mut analyzer, &scene, 2).violations,
        vec![ViolationKind::ExcessiveMovement]
    );

    // The moved mesh became the new reference
    assert!(analyze(&mut analyzer, &scene, 3).violations.is_empty());
}

#[test]
fn test_first_cycle_never_reports_movement() {
    let scene = ScriptedScene::calm();
    scene.move_face(0.3, 0.3);
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));

    assert!(analyze(&mut analyzer, &scene, 0).violations.is_empty());
}

#[test]
fn test_suspicious_pose_reported_with_presence_violation() {
    let scene = ScriptedScene::calm();
    scene.set_people(0);
    scene.set_pose(Some(looking_down_pose()));
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));

    assert_eq!(
        analyze(&mut analyzer, &scene, 0).violations,
        vec![ViolationKind::NoFace, ViolationKind::SuspiciousPose]
    );

    scene.set_people(1);
    scene.set_pose(Some(turned_pose()));
    assert_eq!(
        analyze(&mut analyzer, &scene, 1).violations,
        vec![ViolationKind::SuspiciousPose]
    );
}

#[test]
fn test_presence_failure_still_checks_pose() {
    let scene = ScriptedScene::calm();
    scene.set_presence_failure(true);
    scene.set_pose(Some(looking_down_pose()));
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));

    let findings = analyze(&mut analyzer, &scene, 0);
    assert_eq!(findings.violations, vec![ViolationKind::SuspiciousPose]);
    assert_eq!(findings.detector_errors.len(), 1);
    assert_eq!(findings.people, None);
}

#[test]
fn test_geometry_failure_keeps_previous_landmarks() {
    let scene = ScriptedScene::calm();
    let mut analyzer = CycleAnalyzer::new(create_test_analyzer_config(100));
    analyze(&mut analyzer, &scene, 0);

    scene.set_geometry_failure(true);
    scene.move_face(0.05, 0.0);
    let findings = analyze(&mut analyzer, &scene, 1);
    assert!(findings.violations.is_empty());
    assert_eq!(findings.detector_errors.len(), 1);
    assert_eq!(analyzer.previous_landmarks(), Some(&centred_face()));

    // Movement is measured against the last mesh that was actually tracked
    scene.set_geometry_failure(false);
    scene.move_face(0.06, 0.0);
    assert_eq!(
        analyze(&mut analyzer, &scene, 2).violations,
        vec![ViolationKind::ExcessiveMovement]
    );
}

#[tokio::test]
async fn test_loop_analyses_each_frame_set_once() {
    let scene = ScriptedScene::calm();
    let slot = Arc::new(LatestFrameSlot::new());
    let (context, _termination_rx) = SessionContext::new("cand", Arc::new(EventBus::new(16)));

    let analysis = AnalysisLoop::new(
        create_test_analyzer_config(10),
        Arc::clone(&slot),
        scene.detectors(),
        context.clone(),
    );
    let handle = tokio::spawn(analysis.run());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(scene.presence_calls(), 0);

    slot.publish(create_test_frame_set(1));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(scene.presence_calls(), 1);

    slot.publish(create_test_frame_set(2));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(scene.presence_calls(), 2);

    context.deactivate();
    let report = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(report.frames_analyzed, 2);
    assert_eq!(report.violations, 0);
    assert!(!report.terminated_session);
}

#[tokio::test]
async fn test_loop_terminates_session_at_threshold() {
    let scene = ScriptedScene::calm();
    scene.set_people(0);
    let slot = Arc::new(LatestFrameSlot::new());
    let (context, mut termination_rx) =
        SessionContext::new("cand", Arc::new(EventBus::new(16)));

    let analysis = AnalysisLoop::new(
        create_test_analyzer_config(10),
        Arc::clone(&slot),
        scene.detectors(),
        context.clone(),
    );
    let handle = tokio::spawn(analysis.run());

    let publisher = {
        let slot = Arc::clone(&slot);
        tokio::spawn(async move {
            for sequence in 1..=50 {
                slot.publish(create_test_frame_set(sequence));
                sleep(Duration::from_millis(20)).await;
            }
        })
    };

    let report = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    publisher.abort();

    assert!(report.terminated_session);
    assert_eq!(report.frames_analyzed, u64::from(MAX_WARNINGS));
    assert_eq!(context.engine().warning_count(), MAX_WARNINGS);
    assert_eq!(
        termination_rx.try_recv().unwrap(),
        TerminationReason::WarningThresholdExceeded
    );
}

#[tokio::test]
async fn test_detector_failures_do_not_stop_loop() {
    let scene = ScriptedScene::calm();
    scene.set_presence_failure(true);
    scene.set_pose_failure(true);
    let slot = Arc::new(LatestFrameSlot::new());
    let (context, _termination_rx) = SessionContext::new("cand", Arc::new(EventBus::new(16)));

    let analysis = AnalysisLoop::new(
        create_test_analyzer_config(10),
        Arc::clone(&slot),
        scene.detectors(),
        context.clone(),
    );
    let handle = tokio::spawn(analysis.run());

    for sequence in 1..=3 {
        slot.publish(create_test_frame_set(sequence));
        sleep(Duration::from_millis(50)).await;
    }

    assert!(context.is_active());
    assert!(!handle.is_finished());

    context.deactivate();
    let report = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(report.frames_analyzed, 3);
    assert_eq!(report.detector_errors, 6);
    assert_eq!(context.engine().warning_count(), 0);
}

#[tokio::test]
async fn test_loop_exits_promptly_when_idle() {
    let slot = Arc::new(LatestFrameSlot::new());
    let (context, _termination_rx) = SessionContext::new("cand", Arc::new(EventBus::new(16)));

    let analysis = AnalysisLoop::new(
        create_test_analyzer_config(100),
        slot,
        ScriptedScene::calm().detectors(),
        context.clone(),
    );
    let handle = tokio::spawn(analysis.run());
    sleep(Duration::from_millis(30)).await;

    context.deactivate();
    let report = timeout(Duration::from_millis(500), handle)
        .await
        .expect("analysis loop must observe cancellation during its sleep")
        .unwrap();
    assert_eq!(report.frames_analyzed, 0);
}

/// Presence detector that holds its thread like a real inference call
struct SlowPresence {
    delay: Duration,
}

impl PersonPresenceDetector for SlowPresence {
    fn detect_people(&mut self, _frame: &FrameData) -> Result<Vec<PersonDetection>, DetectorError> {
        std::thread::sleep(self.delay);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_slow_detectors_do_not_block_the_runtime() {
    let slot = Arc::new(LatestFrameSlot::new());
    let (context, _termination_rx) = SessionContext::new("cand", Arc::new(EventBus::new(16)));

    let mut detectors = ScriptedScene::calm().detectors();
    detectors.presence = Box::new(SlowPresence {
        delay: Duration::from_millis(300),
    });

    slot.publish(create_test_frame_set(1));
    let analysis = AnalysisLoop::new(
        create_test_analyzer_config(10),
        Arc::clone(&slot),
        detectors,
        context.clone(),
    );
    let handle = tokio::spawn(analysis.run());

    // Give the loop a chance to start its first cycle
    tokio::task::yield_now().await;

    let started = Instant::now();
    for _ in 0..5 {
        sleep(Duration::from_millis(10)).await;
    }
    assert!(started.elapsed() < Duration::from_millis(250));

    let report = timeout(Duration::from_secs(2), async {
        while context.engine().warning_count() == 0 {
            sleep(Duration::from_millis(10)).await;
        }
        context.deactivate();
        handle.await.unwrap()
    })
    .await
    .unwrap();
    assert_eq!(report.frames_analyzed, 1);
    assert_eq!(context.engine().warning_count(), 1);
}
