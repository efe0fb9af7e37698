// Integration tests for the host-facing capture manager
//
// Host lifecycle events, artifact delivery and error reporting.

use anyhow::Result;
use medassist_capture::capture::CaptureKind;
use medassist_capture::observer::{CollectingObserver, ObservedEvent};
use medassist_capture::platform::{AcquireError, MediaStream, SimulatedPlatform};
use medassist_capture::{
    CaptureError, CaptureManager, Config, ErrorKind, HostEvent, RecorderState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn setup() -> (CaptureManager, Arc<SimulatedPlatform>, Arc<CollectingObserver>) {
    let platform = Arc::new(SimulatedPlatform::with_default_devices());
    let observer = Arc::new(CollectingObserver::new());
    let manager = CaptureManager::new(platform.clone(), &Config::default(), observer.clone());
    (manager, platform, observer)
}

fn nothing_live(platform: &SimulatedPlatform) -> bool {
    platform.streams().iter().all(|stream| !stream.is_live())
}

#[tokio::test(start_paused = true)]
async fn test_stop_recording_delivers_artifact() -> Result<()> {
    let (manager, platform, observer) = setup();

    manager.start_recording().await?;
    platform.emit_chunk(b"abc".to_vec());
    sleep(Duration::from_secs(2)).await;

    let artifact = manager.stop_recording().await?;

    assert_eq!(artifact.duration_seconds(), 2);
    assert_eq!(observer.artifacts(), vec![artifact]);
    assert!(nothing_live(&platform));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dispose_mid_recording_discards_audio() -> Result<()> {
    let (manager, platform, observer) = setup();

    manager.start_recording().await?;
    manager.open_camera(None).await?;
    platform.emit_chunk(b"never delivered".to_vec());
    sleep(Duration::from_secs(1)).await;

    manager.handle_host_event(HostEvent::Disposed).await;

    assert!(observer.artifacts().is_empty());
    assert!(observer
        .events()
        .contains(&ObservedEvent::RecordingComplete(None)));
    assert_eq!(manager.recorder().state().await, RecorderState::Idle);
    assert!(!manager.camera().is_open().await);
    assert!(manager.registry().is_empty());
    assert!(nothing_live(&platform));
    Ok(())
}

#[tokio::test]
async fn test_unloading_behaves_like_disposal() -> Result<()> {
    let (manager, platform, observer) = setup();

    manager.start_recording().await?;
    platform.emit_chunk(b"x".to_vec());

    manager.handle_host_event(HostEvent::Unloading).await;

    assert!(observer.artifacts().is_empty());
    assert!(nothing_live(&platform));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_visibility_lost_finalizes_recording_and_closes_camera() -> Result<()> {
    let (manager, platform, observer) = setup();

    manager.open_camera(None).await?;
    manager.start_recording().await?;
    platform.emit_chunk(b"kept".to_vec());
    sleep(Duration::from_secs(1)).await;

    manager.handle_host_event(HostEvent::VisibilityLost).await;

    let artifacts = observer.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].data(), b"kept");
    assert!(!manager.camera().is_open().await);
    assert!(nothing_live(&platform));
    Ok(())
}

#[tokio::test]
async fn test_visibility_lost_with_nothing_captured_clears_recording() -> Result<()> {
    let (manager, platform, observer) = setup();

    manager.start_recording().await?;
    manager.handle_host_event(HostEvent::VisibilityLost).await;

    let events: Vec<ObservedEvent> = observer
        .events()
        .into_iter()
        .filter(|e| !matches!(e, ObservedEvent::Level(_)))
        .collect();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], ObservedEvent::Error(ErrorKind::EmptyRecording, _)));
    assert_eq!(events[1], ObservedEvent::RecordingComplete(None));
    assert_eq!(manager.recorder().state().await, RecorderState::Idle);
    assert!(nothing_live(&platform));
    Ok(())
}

#[tokio::test]
async fn test_visibility_lost_while_idle_is_quiet() {
    let (manager, _, observer) = setup();

    let report = manager.handle_host_event(HostEvent::VisibilityLost).await;

    assert_eq!(report.tracks_stopped, 0);
    assert!(observer.events().is_empty());
}

#[tokio::test]
async fn test_host_event_sweeps_leaked_streams() {
    let (manager, platform, _) = setup();
    let leaked = platform.open_untracked_stream(CaptureKind::Audio);

    let report = manager.handle_host_event(HostEvent::Disposed).await;

    assert_eq!(report.tracks_stopped, 1);
    assert!(!leaked.is_live());
}

#[tokio::test]
async fn test_errors_are_reported_to_observer() -> Result<()> {
    let (manager, platform, observer) = setup();

    manager.start_recording().await?;
    assert_eq!(
        manager.start_recording().await.unwrap_err(),
        CaptureError::AlreadyRecording
    );
    manager.shutdown().await;

    platform.set_failure(CaptureKind::Video, Some(AcquireError::PermissionDenied));
    assert!(manager.open_camera(None).await.is_err());

    let kinds: Vec<ErrorKind> = observer.errors().into_iter().map(|(kind, _)| kind).collect();
    assert_eq!(
        kinds,
        vec![ErrorKind::AlreadyRecording, ErrorKind::DeviceUnavailable]
    );
    Ok(())
}

#[tokio::test]
async fn test_manager_is_reusable_after_shutdown() -> Result<()> {
    let (manager, platform, _) = setup();

    manager.start_recording().await?;
    manager.shutdown().await;

    platform.queue_chunks(vec![b"again".to_vec()]);
    manager.start_recording().await?;
    let artifact = manager.stop_recording().await?;

    assert_eq!(artifact.data(), b"again");
    Ok(())
}
