use super::*;
use crate::analyzer::ScriptedScene;
use crate::camera::MockCameraDriver;
use crate::config::ProctorConfig;
use crate::error::{CameraError, SessionError};
use crate::events::{EventReceiver, ObserverPayload, ProctorEvent};
use crate::storage::MemorySnapshotStore;
use crate::warning::{TerminationReason, ViolationKind, WarningState, MAX_WARNINGS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

fn create_test_config(analyzer_cycle_ms: u64) -> ProctorConfig {
    let mut config = ProctorConfig::default();
    config.camera.count = 2;
    config.camera.read_timeout_ms = 200;
    config.capture.cycle_interval_ms = 10;
    config.capture.snapshot_interval_seconds = 3600;
    config.analyzer.cycle_interval_ms = analyzer_cycle_ms;
    config.system.stop_timeout_seconds = 2;
    config
}

fn create_test_controller(
    config: ProctorConfig,
    driver: &MockCameraDriver,
    scene: &ScriptedScene,
) -> SessionController {
    let scene = scene.clone();
    SessionController::builder()
        .config(config)
        .driver(Arc::new(driver.clone()))
        .detectors(move || scene.detectors())
        .store(Arc::new(MemorySnapshotStore::new()))
        .build()
        .unwrap()
}

/// Collect observer payloads up to and including the auto-submit notice
async fn collect_until_auto_submit(observer: &mut EventReceiver) -> Vec<ObserverPayload> {
    let mut payloads = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(3), observer.recv())
            .await
            .expect("session should auto-submit")
            .unwrap();
        let terminal = matches!(event, ProctorEvent::AutoSubmitted { .. });
        payloads.extend(event.observer_payload());
        if terminal {
            return payloads;
        }
    }
}

#[tokio::test]
async fn test_repeated_no_face_auto_submits() {
    let driver = MockCameraDriver::new();
    let scene = ScriptedScene::calm();
    scene.set_people(0);
    let controller = create_test_controller(create_test_config(10), &driver, &scene);
    let mut observer = controller.subscribe();

    controller.start("cand-1").await.unwrap();
    let payloads = collect_until_auto_submit(&mut observer).await;

    assert_eq!(
        payloads,
        vec![
            ObserverPayload::WarningUpdate {
                warning_count: 1,
                max_warnings: MAX_WARNINGS
            },
            ObserverPayload::WarningUpdate {
                warning_count: 2,
                max_warnings: MAX_WARNINGS
            },
            ObserverPayload::WarningUpdate {
                warning_count: 3,
                max_warnings: MAX_WARNINGS
            },
            ObserverPayload::AutoSubmitted {
                status: "auto_submitted".to_string(),
                reason: TerminationReason::WarningThresholdExceeded,
                message: TerminationReason::WarningThresholdExceeded
                    .message()
                    .to_string(),
            },
        ]
    );

    let status = controller.status();
    assert!(!status.active);
    assert_eq!(status.warning_count, MAX_WARNINGS);
    assert_eq!(status.candidate_id.as_deref(), Some("cand-1"));
    assert_eq!(status.last_reason, Some(ViolationKind::NoFace));
    assert_eq!(
        status.termination_reason,
        Some(TerminationReason::WarningThresholdExceeded)
    );
    assert!(matches!(status.state, WarningState::Terminated { .. }));

    // Cameras were released exactly once before the notice went out
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.close_count(0), 1);
    assert_eq!(driver.close_count(1), 1);

    // The supervisor already reclaimed the session
    assert!(controller.stop().await.is_none());
}

#[tokio::test]
async fn test_camera_failure_after_warning_auto_submits() {
    let driver = MockCameraDriver::new();
    let scene = ScriptedScene::calm();
    scene.set_people(2);
    let controller = create_test_controller(create_test_config(200), &driver, &scene);
    let mut observer = controller.subscribe();

    controller.start("cand-2").await.unwrap();

    let first = timeout(Duration::from_secs(2), observer.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        first,
        ProctorEvent::WarningIssued {
            warning_count: 1,
            reason: ViolationKind::MultipleFaces,
            ..
        }
    ));

    scene.set_people(1);
    driver.trigger_read_failure(1);

    let payloads = collect_until_auto_submit(&mut observer).await;
    assert_eq!(
        payloads.last(),
        Some(&ObserverPayload::AutoSubmitted {
            status: "auto_submitted".to_string(),
            reason: TerminationReason::CameraFailure,
            message: TerminationReason::CameraFailure.message().to_string(),
        })
    );

    let status = controller.status();
    assert!(!status.active);
    assert_eq!(status.warning_count, 1);
    assert_eq!(status.termination_reason, Some(TerminationReason::CameraFailure));
    assert_eq!(driver.open_handles(), 0);
}

#[tokio::test]
async fn test_second_start_is_rejected_without_reset() {
    let driver = MockCameraDriver::new();
    let scene = ScriptedScene::calm();
    scene.set_people(2);
    let controller = create_test_controller(create_test_config(50), &driver, &scene);
    let mut observer = controller.subscribe();

    let session_id = controller.start("cand-3").await.unwrap();
    timeout(Duration::from_secs(2), observer.recv())
        .await
        .unwrap()
        .unwrap();
    scene.set_people(1);
    let before = controller.status();
    assert_eq!(before.warning_count, 1);

    match controller.start("someone-else").await {
        Err(SessionError::AlreadyActive { candidate_id }) => assert_eq!(candidate_id, "cand-3"),
        other => panic!("Expected AlreadyActive, got {:?}", other),
    }

    let after = controller.status();
    assert!(after.active);
    assert_eq!(after.session_id, Some(session_id));
    assert_eq!(after.warning_count, 1);
    assert_eq!(after.last_reason, Some(ViolationKind::MultipleFaces));
    assert_eq!(driver.total_opens(), 2);

    controller.stop().await;
}

#[tokio::test]
async fn test_stop_releases_cameras_once_and_is_idempotent() {
    let driver = MockCameraDriver::new();
    let scene = ScriptedScene::calm();
    let controller = create_test_controller(create_test_config(20), &driver, &scene);
    let mut events = controller.event_bus().subscribe();

    let session_id = controller.start("cand-4").await.unwrap();
    assert!(controller.is_active());
    sleep(Duration::from_millis(100)).await;

    let summary = controller.stop().await.expect("a session was running");
    assert_eq!(summary.session_id, session_id);
    assert_eq!(summary.outcome, SessionOutcome::Stopped);
    assert_eq!(summary.warning_count, 0);
    assert_eq!(summary.capture.as_ref().unwrap().cameras_released, 2);
    assert!(summary.capture.unwrap().frame_sets > 0);
    assert!(summary.analysis.unwrap().frames_analyzed > 0);

    assert!(controller.stop().await.is_none());
    assert_eq!(driver.close_count(0), 1);
    assert_eq!(driver.close_count(1), 1);
    assert_eq!(driver.open_handles(), 0);

    let status = controller.status();
    assert!(!status.active);
    assert_eq!(status.session_id, Some(session_id));
    assert!(status.termination_reason.is_none());

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.event_type());
    }
    assert_eq!(kinds.first(), Some(&"session_started"));
    assert_eq!(kinds.last(), Some(&"session_stopped"));
    assert!(!kinds.contains(&"auto_submitted"));
}

#[tokio::test]
async fn test_stop_is_prompt_with_default_pacing() {
    let driver = MockCameraDriver::new();
    let scene = ScriptedScene::calm();
    let mut config = ProctorConfig::default();
    config.camera.count = 2;
    let controller = create_test_controller(config, &driver, &scene);

    controller.start("cand-5").await.unwrap();
    sleep(Duration::from_millis(250)).await;

    let started = Instant::now();
    controller.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(driver.open_handles(), 0);
}

#[tokio::test]
async fn test_start_failure_leaves_nothing_open() {
    let driver = MockCameraDriver::new();
    driver.fail_open(1);
    let scene = ScriptedScene::calm();
    let controller = create_test_controller(create_test_config(20), &driver, &scene);

    match controller.start("cand-6").await {
        Err(SessionError::StartFailed(CameraError::Unavailable { index, .. })) => {
            assert_eq!(index, 1)
        }
        other => panic!("Expected StartFailed, got {:?}", other),
    }

    assert_eq!(driver.open_handles(), 0);
    assert!(!controller.is_active());
    assert_eq!(controller.status(), SessionStatus::idle());
    assert!(controller.stop().await.is_none());
}

#[tokio::test]
async fn test_restart_after_auto_submit_resets_warnings() {
    let driver = MockCameraDriver::new();
    let scene = ScriptedScene::calm();
    scene.set_people(0);
    let controller = create_test_controller(create_test_config(10), &driver, &scene);
    let mut observer = controller.subscribe();

    let first = controller.start("cand-7").await.unwrap();
    collect_until_auto_submit(&mut observer).await;

    scene.set_people(1);
    let second = controller.start("cand-7").await.unwrap();
    assert_ne!(first, second);

    let status = controller.status();
    assert!(status.active);
    assert_eq!(status.warning_count, 0);
    assert_eq!(status.state, WarningState::Clean);
    assert!(status.termination_reason.is_none());

    controller.stop().await;
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.total_opens(), 4);
}

#[tokio::test]
async fn test_builder_requires_driver() {
    let result = SessionController::builder()
        .config(ProctorConfig::default())
        .detectors(|| ScriptedScene::calm().detectors())
        .build();
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_auto_submit_notice_always_arrives_on_threaded_runtime() {
    for round in 0..10 {
        let driver = MockCameraDriver::new();
        let scene = ScriptedScene::calm();
        scene.set_people(0);
        let controller = create_test_controller(create_test_config(10), &driver, &scene);
        let mut observer = controller.subscribe();

        controller.start("cand-mt").await.unwrap();
        let payloads = collect_until_auto_submit(&mut observer).await;

        assert_eq!(payloads.len(), MAX_WARNINGS as usize + 1, "round {}", round);
        assert!(matches!(
            payloads.last(),
            Some(ObserverPayload::AutoSubmitted {
                reason: TerminationReason::WarningThresholdExceeded,
                ..
            })
        ));
        assert!(!controller.is_active());
        assert_eq!(driver.open_handles(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_camera_failure_notice_always_arrives_on_threaded_runtime() {
    for round in 0..10 {
        let driver = MockCameraDriver::new();
        let scene = ScriptedScene::calm();
        let controller = create_test_controller(create_test_config(10), &driver, &scene);
        let mut observer = controller.subscribe();

        controller.start("cand-mt").await.unwrap();
        sleep(Duration::from_millis(30)).await;
        driver.trigger_read_failure(0);

        let payloads = collect_until_auto_submit(&mut observer).await;
        assert_eq!(
            payloads.last(),
            Some(&ObserverPayload::AutoSubmitted {
                status: "auto_submitted".to_string(),
                reason: TerminationReason::CameraFailure,
                message: TerminationReason::CameraFailure.message().to_string(),
            }),
            "round {}",
            round
        );
        assert_eq!(
            controller.status().termination_reason,
            Some(TerminationReason::CameraFailure)
        );
        assert_eq!(driver.open_handles(), 0);
    }
}
