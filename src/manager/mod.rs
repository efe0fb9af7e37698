//! Host-facing facade
//!
//! `CaptureManager` owns the stream registry, the audio recorder, the camera
//! controller and the observer. Host lifecycle events fan out into teardown
//! of both capture kinds followed by a sweep.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::camera::CameraController;
use crate::capture::{
    sweep_streams, CameraCatalog, CameraSelector, DeviceAcquirer, StreamRegistry, SweepReport,
    VideoConstraints,
};
use crate::config::Config;
use crate::error::{CaptureError, Result};
use crate::observer::CaptureObserver;
use crate::platform::{CapturedFrame, MediaPlatform, PreviewSurface};
use crate::recording::{AudioRecorder, RecordingArtifact};

/// Lifecycle signals from the host page or window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostEvent {
    /// The owning component was destroyed
    Disposed,
    /// The host went to the background; it is still alive
    VisibilityLost,
    /// The host is about to unload
    Unloading,
}

pub struct CaptureManager {
    platform: Arc<dyn MediaPlatform>,
    registry: StreamRegistry,
    recorder: AudioRecorder,
    camera: CameraController,
    observer: Arc<dyn CaptureObserver>,
    video_defaults: VideoConstraints,
}

impl CaptureManager {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        config: &Config,
        observer: Arc<dyn CaptureObserver>,
    ) -> Self {
        let registry = StreamRegistry::new();
        let acquirer = DeviceAcquirer::new(Arc::clone(&platform), registry.clone(), &config.capture);
        let video_defaults = config.video.constraints();

        let recorder = AudioRecorder::new(
            acquirer.clone(),
            config.audio.clone(),
            config.quality.clone(),
            config.capture.watchdog_interval(),
            Arc::clone(&observer),
        );
        let camera = CameraController::new(
            acquirer,
            video_defaults.clone(),
            config.capture.watchdog_interval(),
            Arc::clone(&observer),
        );

        info!("Capture manager ready on {} platform", platform.name());

        Self {
            platform,
            registry,
            recorder,
            camera,
            observer,
            video_defaults,
        }
    }

    pub fn recorder(&self) -> &AudioRecorder {
        &self.recorder
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Forward an error to the observer before handing it back
    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.observer.on_error(e.kind(), e.to_string());
        }
        result
    }

    pub async fn start_recording(&self) -> Result<()> {
        let result = self.recorder.start().await;
        self.report(result)
    }

    /// Finalize the recording and deliver it to the observer
    pub async fn stop_recording(&self) -> Result<RecordingArtifact> {
        let result = self.recorder.stop().await;
        let artifact = self.report(result)?;
        self.observer.on_recording_complete(Some(artifact.clone()));
        Ok(artifact)
    }

    /// Open the camera with the given constraints, or the configured defaults
    pub async fn open_camera(&self, constraints: Option<VideoConstraints>) -> Result<()> {
        let constraints = constraints.unwrap_or_else(|| self.video_defaults.clone());
        let result = self.camera.start(constraints).await;
        self.report(result)
    }

    pub async fn switch_camera(&self) -> Result<CameraSelector> {
        let result = self.camera.switch_camera().await;
        self.report(result)
    }

    pub async fn lend_preview(&self, surface: Arc<dyn PreviewSurface>) -> Result<()> {
        let result = self.camera.lend_preview(surface).await;
        self.report(result)
    }

    pub async fn capture_still(&self) -> Result<CapturedFrame> {
        let result = self.camera.capture_still().await;
        self.report(result)
    }

    pub async fn close_camera(&self) -> bool {
        self.camera.close().await
    }

    pub async fn enumerate_video_devices(&self) -> Result<CameraCatalog> {
        let result = self.camera.refresh_catalog().await;
        self.report(result)
    }

    /// Force-stop every live stream: registered ones and anything the platform
    /// still reports as live
    pub fn sweep(&self) -> SweepReport {
        let mut report = self.registry.sweep();
        report.merge(sweep_streams(self.platform.active_streams()));

        if report.tracks_stopped > 0 {
            warn!(
                "Sweep stopped {} leaked tracks ({} failures)",
                report.tracks_stopped, report.failures
            );
        }
        report
    }

    pub async fn handle_host_event(&self, event: HostEvent) -> SweepReport {
        info!("Host event: {:?}", event);

        match event {
            HostEvent::Disposed | HostEvent::Unloading => {
                let (discarded, _) = futures::join!(self.recorder.dispose(), self.camera.close());
                if discarded {
                    self.observer.on_recording_complete(None);
                }
            }
            HostEvent::VisibilityLost => {
                let (stopped, _) = futures::join!(self.recorder.stop(), self.camera.close());
                match stopped {
                    Ok(artifact) => self.observer.on_recording_complete(Some(artifact)),
                    Err(CaptureError::NoActiveRecording) => {}
                    Err(e) => {
                        self.observer.on_error(e.kind(), e.to_string());
                        self.observer.on_recording_complete(None);
                    }
                }
            }
        }

        self.sweep()
    }

    /// Discard everything and sweep; the manager stays usable afterwards
    pub async fn shutdown(&self) -> SweepReport {
        self.handle_host_event(HostEvent::Disposed).await
    }
}
