// Integration tests for the camera controller
//
// Device switching, preview lending, still capture and the ready timeout.

use anyhow::Result;
use medassist_capture::capture::{CameraSelector, CaptureKind, FacingMode};
use medassist_capture::config::ReadyFallback;
use medassist_capture::observer::CollectingObserver;
use medassist_capture::platform::{
    MediaStream, MediaTrack, PlatformEvent, PreviewSurface, ReadyBehavior, SimulatedPlatform,
};
use medassist_capture::{CaptureError, CaptureManager, Config, ErrorKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Preview surface that remembers which stream it shows
#[derive(Default)]
struct TestSurface {
    showing: Mutex<Option<String>>,
}

impl TestSurface {
    fn showing(&self) -> Option<String> {
        self.showing.lock().unwrap().clone()
    }
}

impl PreviewSurface for TestSurface {
    fn attach(&self, stream: Arc<dyn MediaStream>) {
        *self.showing.lock().unwrap() = Some(stream.id().to_string());
    }

    fn detach(&self) {
        *self.showing.lock().unwrap() = None;
    }
}

fn manager_with(config: Config) -> (CaptureManager, Arc<SimulatedPlatform>, Arc<CollectingObserver>) {
    let platform = Arc::new(SimulatedPlatform::with_default_devices());
    let observer = Arc::new(CollectingObserver::new());
    let manager = CaptureManager::new(platform.clone(), &config, observer.clone());
    (manager, platform, observer)
}

fn opened_device(event: &PlatformEvent) -> Option<&str> {
    match event {
        PlatformEvent::StreamOpened { device_id, .. } => Some(device_id.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn test_switch_ends_old_camera_before_opening_next() -> Result<()> {
    let (manager, platform, _) = manager_with(Config::default());

    let catalog = manager.enumerate_video_devices().await?;
    assert_eq!(catalog.len(), 2);
    assert!(catalog.can_switch());

    manager.open_camera(None).await?;
    let first = platform.last_stream().expect("first camera");
    assert_eq!(first.device_id(), "cam-back");

    let selector = manager.switch_camera().await?;
    assert_eq!(selector, CameraSelector::DeviceId("cam-front".to_string()));

    let events = platform.events();
    let first_track = first.simulated_tracks()[0].clone();
    let ended_at = events
        .iter()
        .position(|e| {
            matches!(e, PlatformEvent::TrackStopped { track_id } if track_id == first_track.id())
        })
        .expect("camera A stopped");
    let opened_at = events
        .iter()
        .rposition(|e| opened_device(e) == Some("cam-front"))
        .expect("camera B opened");

    assert!(ended_at < opened_at, "camera A must end before camera B opens");
    assert!(!first.is_live());
    assert_eq!(manager.registry().len(), 1);

    manager.close_camera().await;
    Ok(())
}

#[tokio::test]
async fn test_switch_cycles_and_wraps_around() -> Result<()> {
    let (manager, platform, _) = manager_with(Config::default());

    manager.open_camera(None).await?;
    manager.switch_camera().await?;
    manager.switch_camera().await?;

    assert_eq!(opened_devices(&platform), vec!["cam-back", "cam-front", "cam-back"]);

    manager.close_camera().await;
    Ok(())
}

fn opened_devices(platform: &SimulatedPlatform) -> Vec<String> {
    platform
        .events()
        .iter()
        .filter_map(|e| opened_device(e).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_switch_with_blank_labels_moves_to_other_camera() -> Result<()> {
    let platform = Arc::new(SimulatedPlatform::new());
    platform.add_camera("cam-back", "", FacingMode::Environment);
    platform.add_camera("cam-front", "", FacingMode::User);
    let manager = CaptureManager::new(
        platform.clone(),
        &Config::default(),
        Arc::new(CollectingObserver::new()),
    );

    manager.open_camera(None).await?;
    assert_eq!(manager.camera().current_device().await.as_deref(), Some("cam-back"));

    let selector = manager.switch_camera().await?;

    assert_eq!(selector, CameraSelector::DeviceId("cam-front".to_string()));
    assert_eq!(opened_devices(&platform), vec!["cam-back", "cam-front"]);

    manager.close_camera().await;
    Ok(())
}

#[tokio::test]
async fn test_switch_with_duplicate_labels_and_no_reported_device() -> Result<()> {
    let platform = Arc::new(SimulatedPlatform::new());
    platform.set_reports_device_ids(false);
    platform.add_camera("usb-1", "USB Camera", FacingMode::Environment);
    platform.add_camera("usb-2", "USB Camera", FacingMode::User);
    let manager = CaptureManager::new(
        platform.clone(),
        &Config::default(),
        Arc::new(CollectingObserver::new()),
    );

    manager.open_camera(None).await?;
    assert_eq!(manager.camera().current_device().await, None);

    manager.switch_camera().await?;
    manager.switch_camera().await?;

    assert_eq!(opened_devices(&platform), vec!["usb-1", "usb-2", "usb-1"]);

    manager.close_camera().await;
    Ok(())
}

#[tokio::test]
async fn test_single_camera_toggles_facing_mode() -> Result<()> {
    let platform = Arc::new(SimulatedPlatform::new());
    platform.add_camera("cam-0", "Laptop Camera", FacingMode::User);
    let manager = CaptureManager::new(
        platform.clone(),
        &Config::default(),
        Arc::new(CollectingObserver::new()),
    );

    manager.open_camera(None).await?;
    assert_eq!(
        manager.switch_camera().await?,
        CameraSelector::FacingMode(FacingMode::User)
    );
    assert_eq!(
        manager.switch_camera().await?,
        CameraSelector::FacingMode(FacingMode::Environment)
    );

    manager.close_camera().await;
    Ok(())
}

#[tokio::test]
async fn test_preview_follows_switch_and_detaches_on_close() -> Result<()> {
    let (manager, platform, _) = manager_with(Config::default());
    let surface = Arc::new(TestSurface::default());

    manager.open_camera(None).await?;
    manager.lend_preview(surface.clone()).await?;
    let first = platform.last_stream().expect("first camera");
    assert_eq!(surface.showing().as_deref(), Some(first.id()));

    manager.switch_camera().await?;
    let second = platform.last_stream().expect("second camera");
    assert_eq!(surface.showing().as_deref(), Some(second.id()));

    manager.close_camera().await;
    assert_eq!(surface.showing(), None);
    Ok(())
}

#[tokio::test]
async fn test_lend_preview_without_camera_fails() {
    let (manager, _, observer) = manager_with(Config::default());

    let err = manager
        .lend_preview(Arc::new(TestSurface::default()))
        .await
        .unwrap_err();

    assert_eq!(err, CaptureError::NoCameraOpen);
    assert_eq!(observer.errors()[0].0, ErrorKind::NoCameraOpen);
}

#[tokio::test]
async fn test_capture_still_closes_camera() -> Result<()> {
    let (manager, platform, _) = manager_with(Config::default());
    platform.set_frame_size(1280, 720);

    manager.open_camera(None).await?;
    let frame = manager.capture_still().await?;

    assert_eq!((frame.width, frame.height), (1280, 720));
    assert!(!frame.data.is_empty());
    assert!(!manager.camera().is_open().await);
    assert!(!platform.last_stream().expect("camera").is_live());
    assert!(manager.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_zero_sized_frame_is_rejected_and_camera_still_closed() -> Result<()> {
    let (manager, platform, _) = manager_with(Config::default());
    platform.set_frame_size(0, 480);

    manager.open_camera(None).await?;
    let err = manager.capture_still().await.unwrap_err();

    assert_eq!(
        err,
        CaptureError::InvalidFrame {
            width: 0,
            height: 480
        }
    );
    assert!(!manager.camera().is_open().await);
    assert!(manager.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_capture_still_without_camera() {
    let (manager, _, _) = manager_with(Config::default());

    let err = manager.capture_still().await.unwrap_err();
    assert_eq!(err, CaptureError::NoCameraOpen);
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_fails_by_default() {
    let (manager, platform, _) = manager_with(Config::default());
    platform.set_ready_behavior(ReadyBehavior::Never);

    let err = manager.open_camera(None).await.unwrap_err();

    match err {
        CaptureError::DeviceUnavailable { kind, reason } => {
            assert_eq!(kind, CaptureKind::Video);
            assert!(reason.contains("2000ms"), "reason was {}", reason);
        }
        other => panic!("Expected DeviceUnavailable, got {:?}", other),
    }
    assert!(!manager.camera().is_open().await);
    assert!(!platform.last_stream().expect("stream").is_live());
    assert!(manager.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_can_proceed() -> Result<()> {
    let mut config = Config::default();
    config.capture.ready_fallback = ReadyFallback::Proceed;
    let (manager, platform, _) = manager_with(config);
    platform.set_ready_behavior(ReadyBehavior::Never);

    manager.open_camera(None).await?;

    assert!(manager.camera().is_open().await);
    manager.close_camera().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unplugged_camera_is_reported() -> Result<()> {
    let (manager, platform, observer) = manager_with(Config::default());

    manager.open_camera(None).await?;
    platform.last_stream().expect("camera").simulated_tracks()[0].end_unexpectedly();

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!manager.camera().is_open().await);
    assert!(manager.registry().is_empty());
    let errors = observer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ErrorKind::CaptureLost);
    assert!(errors[0].1.contains("Back Camera"));
    Ok(())
}

#[tokio::test]
async fn test_no_camera_devices() -> Result<()> {
    let platform = Arc::new(SimulatedPlatform::new());
    platform.add_microphone("mic-0", "Mic");
    let manager = CaptureManager::new(
        platform,
        &Config::default(),
        Arc::new(CollectingObserver::new()),
    );

    let catalog = manager.enumerate_video_devices().await?;
    assert!(catalog.is_empty());

    let err = manager.open_camera(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
    Ok(())
}
