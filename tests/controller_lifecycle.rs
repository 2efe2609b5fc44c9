mod common;

use common::{controller, dark, eventually, fast_config, FakeBackend};
use owlwatch::camera::camera_entity::CameraStatus;
use owlwatch::camera_config::{CameraConfig, DetectorKind, SourceKind};
use owlwatch::core::events::SystemEvent;
use owlwatch::core::system_controller::SystemState;
use owlwatch::errors::SystemError;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn two_cameras() -> Vec<CameraConfig> {
    vec![
        CameraConfig::local("cam-1", "Lobby", 0).with_detectors(&[DetectorKind::Motion]),
        CameraConfig::stream("cam-2", "Gate", SourceKind::Rtsp, "rtsp://10.0.0.7/live")
            .with_detectors(&[DetectorKind::Intrusion]),
    ]
}

#[tokio::test]
async fn restart_brings_cameras_back_without_leaking_handles() {
    let backend = FakeBackend::new();
    let _feed_1 = backend.camera("cam-1");
    let _feed_2 = backend.camera("cam-2");
    let ctl = &controller(&fast_config(two_cameras()), backend.clone()).await;

    for round in 1..=2 {
        assert_eq!(ctl.start().await, Ok(SystemState::Running));
        let status = ctl.status().await;
        assert_eq!(status.running_cameras(), 2, "round {}", round);
        assert_eq!(backend.open_handles(), 2);

        assert_eq!(ctl.stop().await, Ok(SystemState::Stopped));
        let status = ctl.status().await;
        assert!(status.cameras.iter().all(|c| c.status == CameraStatus::Stopped));
        assert_eq!(backend.open_handles(), 0);
    }
    assert_eq!(backend.opens(), 4);
}

#[tokio::test]
async fn stop_during_frame_wait_finishes_within_grace() {
    let backend = FakeBackend::new();
    let _feed = backend.camera("cam-1");
    let mut config = fast_config(vec![CameraConfig::local("cam-1", "Lobby", 0)]);
    config.app_settings.frame_wait_ms = 10_000;
    config.app_settings.stream_timeout_ms = 60_000;
    let ctl = &controller(&config, backend.clone()).await;

    ctl.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopped = tokio::time::timeout(Duration::from_millis(500), ctl.stop()).await;
    assert_eq!(stopped.expect("stop exceeded grace"), Ok(SystemState::Stopped));
    assert_eq!(ctl.registry().get("cam-1").await.unwrap().status, CameraStatus::Stopped);
    assert_eq!(backend.open_handles(), 0);
}

#[tokio::test]
async fn one_failing_camera_does_not_block_the_others() {
    let backend = FakeBackend::new();
    let _feed = backend.camera("cam-1");
    backend.fail_opens("cam-2");
    let ctl = &controller(&fast_config(two_cameras()), backend.clone()).await;
    let mut events = ctl.subscribe();

    assert_eq!(ctl.start().await, Ok(SystemState::Running));
    assert_eq!(ctl.registry().get("cam-1").await.unwrap().status, CameraStatus::Running);
    assert!(matches!(ctl.registry().get("cam-2").await.unwrap().status, CameraStatus::Error(_)));
    // cam-2 is a network camera: both configured attempts were made
    assert_eq!(backend.opens(), 3);

    let mut started = None;
    while let Ok(event) = events.try_recv() {
        if let SystemEvent::SystemStarted { running, failed } = event {
            started = Some((running, failed));
        }
    }
    let (running, failed) = started.expect("SystemStarted published");
    assert_eq!(running, vec!["cam-1".to_string()]);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].starts_with("cam-2"));

    ctl.stop().await.unwrap();
}

#[tokio::test]
async fn start_fails_when_no_camera_starts() {
    let backend = FakeBackend::new();
    backend.fail_opens("cam-1");
    backend.fail_opens("cam-2");
    let ctl = &controller(&fast_config(two_cameras()), backend.clone()).await;

    match ctl.start().await {
        Err(SystemError::NoCameraStarted { attempted, failures }) => {
            assert_eq!(attempted, 2);
            assert_eq!(failures.len(), 2);
        }
        other => panic!("unexpected start result {:?}", other),
    }
    assert_eq!(ctl.state(), SystemState::Stopped);
    assert_eq!(ctl.status().await.failed_cameras(), 2);
    assert_eq!(backend.open_handles(), 0);
}

#[tokio::test]
async fn start_and_stop_are_reentrant() {
    let backend = FakeBackend::new();
    let _feed = backend.camera("cam-1");
    let ctl = &controller(&fast_config(vec![CameraConfig::local("cam-1", "Lobby", 0)]), backend.clone()).await;

    assert_eq!(ctl.stop().await, Ok(SystemState::Stopped));
    assert_eq!(ctl.start().await, Ok(SystemState::Running));
    assert_eq!(ctl.start().await, Ok(SystemState::Running));
    assert_eq!(backend.opens(), 1);

    let (first, second) = tokio::join!(ctl.stop(), ctl.stop());
    assert!(first.is_ok() && second.is_ok());
    assert_eq!(ctl.state(), SystemState::Stopped);
    assert_eq!(backend.open_handles(), 0);
}

#[tokio::test]
async fn hung_pipeline_is_forced_down_after_grace() {
    let backend = FakeBackend::new();
    let _feed = backend.camera("cam-1");
    backend.hang_on_close("cam-1");
    let mut config = fast_config(vec![CameraConfig::local("cam-1", "Lobby", 0)]);
    config.app_settings.shutdown_grace_ms = 100;
    let ctl = &controller(&config, backend.clone()).await;

    ctl.start().await.unwrap();
    match ctl.stop().await {
        Err(SystemError::ShutdownTimedOut { grace, cameras }) => {
            assert_eq!(grace, Duration::from_millis(100));
            assert_eq!(cameras, vec!["cam-1".to_string()]);
        }
        other => panic!("unexpected stop result {:?}", other),
    }
    assert_eq!(ctl.state(), SystemState::Stopped);
    let status = ctl.registry().get("cam-1").await.unwrap().status;
    assert!(matches!(status, CameraStatus::Error(_)));
}

#[tokio::test]
async fn alerts_survive_a_restart_and_can_be_acknowledged() {
    let backend = FakeBackend::new();
    let feed = backend.camera("cam-1");
    let config = fast_config(vec![CameraConfig::local("cam-1", "Lobby", 0).with_detectors(&[DetectorKind::Motion])]);
    let ctl = &controller(&config, backend.clone()).await;

    ctl.start().await.unwrap();
    feed.send(dark()).unwrap();
    feed.send(image::RgbImage::from_pixel(32, 24, image::Rgb([200, 200, 200]))).unwrap();
    assert!(eventually(WAIT, || async move { ctl.alerts().await.len() == 1 }).await);
    ctl.stop().await.unwrap();
    ctl.start().await.unwrap();

    let alerts = ctl.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert!(!alerts[0].acknowledged);
    ctl.acknowledge(alerts[0].id).await.unwrap();
    assert!(ctl.alert_manager().unacknowledged().await.is_empty());

    ctl.stop().await.unwrap();
}

#[tokio::test]
async fn stop_cancels_a_start_stuck_in_connect_backoff() {
    let backend = FakeBackend::new();
    let _feed = backend.camera("cam-1");
    backend.fail_opens("cam-2");
    let mut config = fast_config(two_cameras());
    config.app_settings.retry.max_attempts = 5;
    config.app_settings.retry.initial_backoff_ms = 1_000;
    config.app_settings.retry.max_backoff_ms = 1_000;
    let ctl = &controller(&config, backend.clone()).await;

    let (started, (stopped, took)) = tokio::join!(ctl.start(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let begin = tokio::time::Instant::now();
        let result = ctl.stop().await;
        (result, begin.elapsed())
    });

    assert_eq!(started, Ok(SystemState::Stopped));
    assert_eq!(stopped, Ok(SystemState::Stopped));
    assert!(took < Duration::from_millis(500), "stop took {:?}", took);
    // cam-2 never got past its first backoff
    assert_eq!(backend.opens(), 2);
    assert_eq!(backend.open_handles(), 0);
    assert_eq!(ctl.state(), SystemState::Stopped);
    let status = ctl.status().await;
    assert!(status.cameras.iter().all(|c| c.status == CameraStatus::Stopped));
}

#[tokio::test]
async fn losing_every_camera_stops_the_system_and_allows_a_restart() {
    let backend = FakeBackend::new();
    let _feed = backend.camera("cam-1");
    let mut config = fast_config(vec![CameraConfig::local("cam-1", "Lobby", 0)]);
    config.app_settings.stream_timeout_ms = 100;
    let ctl = &controller(&config, backend.clone()).await;
    let mut events = ctl.subscribe();

    assert_eq!(ctl.start().await, Ok(SystemState::Running));
    assert!(eventually(WAIT, || async move { ctl.state() == SystemState::Stopped }).await);
    assert_eq!(ctl.status().await.failed_cameras(), 1);
    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        saw_failure |= matches!(event, SystemEvent::SystemFailure(_));
    }
    assert!(saw_failure);

    assert_eq!(ctl.reset_camera("cam-1").await, Ok(CameraStatus::Stopped));
    assert_eq!(ctl.start().await, Ok(SystemState::Running));
    assert_eq!(ctl.registry().get("cam-1").await.unwrap().status, CameraStatus::Running);
    assert_eq!(backend.opens(), 2);

    assert_eq!(ctl.stop().await, Ok(SystemState::Stopped));
    assert_eq!(backend.open_handles(), 0);
}
