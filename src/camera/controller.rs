use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::{
    CameraCatalog, CameraSelector, CaptureConstraints, CaptureKind, DeviceAcquirer, FacingMode,
    SessionSlot, SessionState, TrackWatchdog, VideoConstraints,
};
use crate::error::{CaptureError, Result};
use crate::observer::CaptureObserver;
use crate::platform::{CapturedFrame, PreviewSurface};

struct CameraCore {
    slot: SessionSlot,
    catalog: CameraCatalog,
    /// Constraints of the most recent open, reused (re-targeted) on switch
    constraints: VideoConstraints,
    current_device: Option<String>,
    facing_mode: FacingMode,
    preview: Option<Arc<dyn PreviewSurface>>,
    watchdog: Option<TrackWatchdog>,
}

impl CameraCore {
    fn session_id(&self) -> Option<Uuid> {
        self.slot.get().filter(|s| s.is_open()).map(|s| s.id())
    }

    fn teardown(&mut self) -> bool {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        self.preview = None;
        self.slot.close().performed
    }
}

/// Owns the single camera session: open, switch, preview, still capture
pub struct CameraController {
    core: Arc<Mutex<CameraCore>>,
    acquirer: DeviceAcquirer,
    watchdog_interval: Duration,
    observer: Arc<dyn CaptureObserver>,
}

impl CameraController {
    pub fn new(
        acquirer: DeviceAcquirer,
        defaults: VideoConstraints,
        watchdog_interval: Duration,
        observer: Arc<dyn CaptureObserver>,
    ) -> Self {
        let facing_mode = match &defaults.source {
            CameraSelector::FacingMode(mode) => *mode,
            CameraSelector::DeviceId(_) => FacingMode::Environment,
        };

        Self {
            core: Arc::new(Mutex::new(CameraCore {
                slot: SessionSlot::new(CaptureKind::Video),
                catalog: CameraCatalog::default(),
                constraints: defaults,
                current_device: None,
                facing_mode,
                preview: None,
                watchdog: None,
            })),
            acquirer,
            watchdog_interval,
            observer,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.core.lock().await.slot.is_open()
    }

    pub async fn session_state(&self) -> SessionState {
        self.core.lock().await.slot.state()
    }

    pub async fn catalog(&self) -> CameraCatalog {
        self.core.lock().await.catalog.clone()
    }

    pub async fn current_device(&self) -> Option<String> {
        self.core.lock().await.current_device.clone()
    }

    pub async fn facing_mode(&self) -> FacingMode {
        self.core.lock().await.facing_mode
    }

    /// Open the camera; any session already held is closed first
    pub async fn start(&self, constraints: VideoConstraints) -> Result<()> {
        let catalog = self.acquirer.enumerate_video_devices().await;

        let mut core = self.core.lock().await;
        match catalog {
            Ok(catalog) => core.catalog = catalog,
            Err(e) => warn!("Camera enumeration failed, keeping previous catalog: {}", e),
        }
        self.open_locked(&mut core, constraints).await
    }

    /// Rebuild the device catalog
    pub async fn refresh_catalog(&self) -> Result<CameraCatalog> {
        let catalog = self.acquirer.enumerate_video_devices().await?;
        let mut core = self.core.lock().await;
        core.catalog = catalog.clone();
        Ok(catalog)
    }

    /// Move to the next camera
    ///
    /// With two or more cameras this cycles through device ids; otherwise it
    /// flips the facing mode. The old session is fully closed before the new
    /// one is requested, and a lent preview follows the new stream.
    pub async fn switch_camera(&self) -> Result<CameraSelector> {
        let catalog = self.acquirer.enumerate_video_devices().await?;
        let mut core = self.core.lock().await;
        core.catalog = catalog;

        let next = match core.catalog.next_after(core.current_device.as_deref()) {
            Some(camera) if core.catalog.can_switch() => {
                info!("Switching to camera '{}' ({})", camera.label, camera.id);
                core.constraints.with_device(camera.id.clone())
            }
            _ => {
                let mode = core.facing_mode.toggled();
                info!("Switching facing mode to {:?}", mode);
                core.constraints.with_facing_mode(mode)
            }
        };

        let selector = next.source.clone();
        let preview = core.preview.clone();
        self.open_locked(&mut core, next).await?;

        if let Some(surface) = preview {
            self.lend_locked(&mut core, surface)?;
        }

        Ok(selector)
    }

    /// Lend the open stream to a preview surface
    pub async fn lend_preview(&self, surface: Arc<dyn PreviewSurface>) -> Result<()> {
        let mut core = self.core.lock().await;
        self.lend_locked(&mut core, surface)
    }

    /// Grab one frame, then close the camera whatever the outcome
    pub async fn capture_still(&self) -> Result<CapturedFrame> {
        let mut core = self.core.lock().await;

        let stream = match core.slot.get().filter(|s| s.is_open()) {
            Some(session) => session.stream().ok_or(CaptureError::NoCameraOpen)?,
            None => return Err(CaptureError::NoCameraOpen),
        };

        let result = self.acquirer.platform().grab_frame(stream).await;
        core.teardown();

        let frame = result.map_err(CaptureError::platform)?;
        if frame.width == 0 || frame.height == 0 {
            warn!("Rejected {}x{} frame", frame.width, frame.height);
            return Err(CaptureError::InvalidFrame {
                width: frame.width,
                height: frame.height,
            });
        }

        info!(
            "Captured {}x{} still ({} bytes), camera closed",
            frame.width,
            frame.height,
            frame.data.len()
        );
        Ok(frame)
    }

    /// Release the camera; safe to call repeatedly
    pub async fn close(&self) -> bool {
        let mut core = self.core.lock().await;
        let closed = core.teardown();
        if closed {
            info!("Camera closed");
        }
        closed
    }

    async fn open_locked(&self, core: &mut CameraCore, constraints: VideoConstraints) -> Result<()> {
        if let Some(watchdog) = core.watchdog.take() {
            watchdog.stop();
        }
        core.preview = None;

        let source = constraints.source.clone();
        let session = core
            .slot
            .open(&self.acquirer, CaptureConstraints::Video(constraints.clone()))
            .await?;

        let session_id = session.id();
        let tracks = session.tracks().to_vec();
        let label = tracks
            .first()
            .map(|track| track.label().to_string())
            .unwrap_or_default();
        let reported = tracks
            .first()
            .and_then(|track| track.device_id().map(str::to_string));

        core.constraints = constraints;
        if let CameraSelector::FacingMode(mode) = &source {
            core.facing_mode = *mode;
        }
        core.current_device = reported.or_else(|| match source {
            CameraSelector::DeviceId(id) => Some(id),
            CameraSelector::FacingMode(_) => core
                .catalog
                .find_by_label(&label)
                .map(|camera| camera.id.clone()),
        });
        if core.current_device.is_none() {
            debug!("Open camera could not be matched to a catalog entry");
        }

        core.watchdog = Some(TrackWatchdog::spawn(
            CaptureKind::Video,
            tracks,
            self.watchdog_interval,
            self.loss_handler(session_id),
        ));

        info!("Camera '{}' open (session {})", label, session_id);
        Ok(())
    }

    fn lend_locked(&self, core: &mut CameraCore, surface: Arc<dyn PreviewSurface>) -> Result<()> {
        let session = core
            .slot
            .get_mut()
            .filter(|s| s.is_open())
            .ok_or(CaptureError::NoCameraOpen)?;
        session.lend_preview(Arc::clone(&surface))?;
        core.preview = Some(surface);
        Ok(())
    }

    fn loss_handler(
        &self,
        session_id: Uuid,
    ) -> impl FnOnce(CaptureError) -> BoxFuture<'static, ()> + Send + 'static {
        let core = Arc::clone(&self.core);
        let observer = Arc::clone(&self.observer);

        move |err: CaptureError| {
            async move {
                {
                    let mut core = core.lock().await;
                    if core.session_id() != Some(session_id) {
                        debug!("Ignoring loss report for replaced camera session {}", session_id);
                        return;
                    }

                    error!("Camera lost: {}", err);
                    core.teardown();
                }

                observer.on_error(err.kind(), err.to_string());
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StreamRegistry;
    use crate::config::CaptureSettings;
    use crate::observer::NoopObserver;
    use crate::platform::SimulatedPlatform;

    fn controller(platform: Arc<SimulatedPlatform>) -> CameraController {
        let acquirer = DeviceAcquirer::new(
            platform,
            StreamRegistry::new(),
            &CaptureSettings::default(),
        );
        CameraController::new(
            acquirer,
            VideoConstraints::default(),
            Duration::from_secs(1),
            Arc::new(NoopObserver),
        )
    }

    #[tokio::test]
    async fn test_facing_mode_open_resolves_device_id() {
        let platform = Arc::new(SimulatedPlatform::with_default_devices());
        let camera = controller(platform);

        camera.refresh_catalog().await.unwrap();
        camera.start(VideoConstraints::default()).await.unwrap();

        assert_eq!(camera.current_device().await.as_deref(), Some("cam-back"));
        assert_eq!(camera.facing_mode().await, FacingMode::Environment);
    }

    #[tokio::test]
    async fn test_single_camera_switch_toggles_facing_mode() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.add_camera("cam-only", "Only Camera", FacingMode::Environment);
        let camera = controller(platform);

        camera.start(VideoConstraints::default()).await.unwrap();
        let selector = camera.switch_camera().await.unwrap();

        assert_eq!(selector, CameraSelector::FacingMode(FacingMode::User));
        assert_eq!(camera.facing_mode().await, FacingMode::User);
        assert!(camera.is_open().await);
    }

    #[tokio::test]
    async fn test_close_twice_reports_once() {
        let platform = Arc::new(SimulatedPlatform::with_default_devices());
        let camera = controller(platform);

        camera.start(VideoConstraints::default()).await.unwrap();
        assert!(camera.close().await);
        assert!(!camera.close().await);
        assert_eq!(camera.session_state().await, SessionState::Closed);
    }
}
