use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::catalog::CameraCatalog;
use super::constraints::{CaptureConstraints, CaptureKind};
use super::registry::StreamRegistry;
use super::session::{CaptureSession, CloseReport, SessionState};
use crate::config::{CaptureSettings, ReadyFallback};
use crate::error::{CaptureError, Result};
use crate::platform::MediaPlatform;

/// Opens hardware streams and enumerates devices
///
/// Every granted stream is registered with the shared `StreamRegistry`
/// before anything else can fail, so the sweep can always reach it.
#[derive(Clone)]
pub struct DeviceAcquirer {
    platform: Arc<dyn MediaPlatform>,
    registry: StreamRegistry,
    ready_timeout: Duration,
    ready_fallback: ReadyFallback,
}

impl DeviceAcquirer {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        registry: StreamRegistry,
        settings: &CaptureSettings,
    ) -> Self {
        Self {
            platform,
            registry,
            ready_timeout: settings.ready_timeout(),
            ready_fallback: settings.ready_fallback,
        }
    }

    pub fn platform(&self) -> &Arc<dyn MediaPlatform> {
        &self.platform
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Request a stream and wait (bounded) for it to report ready
    ///
    /// On failure no session exists and nothing stays registered.
    pub async fn open_capture(
        &self,
        kind: CaptureKind,
        constraints: CaptureConstraints,
    ) -> Result<CaptureSession> {
        if constraints.kind() != kind {
            return Err(CaptureError::InvalidConstraints(format!(
                "{} constraints supplied for a {} capture",
                constraints.kind(),
                kind
            )));
        }

        let request = constraints.to_request();
        info!("Requesting {} stream from {} platform", kind, self.platform.name());

        let stream = self
            .platform
            .request_media_stream(&request)
            .await
            .map_err(|e| {
                warn!("{} acquisition failed: {}", kind, e);
                CaptureError::DeviceUnavailable {
                    kind,
                    reason: e.to_string(),
                }
            })?;

        self.registry.register(Arc::clone(&stream));
        let mut session = CaptureSession::new(constraints, Arc::clone(&stream), self.registry.clone());

        if tokio::time::timeout(self.ready_timeout, stream.ready())
            .await
            .is_err()
        {
            match self.ready_fallback {
                ReadyFallback::Fail => {
                    session.close();
                    return Err(CaptureError::DeviceUnavailable {
                        kind,
                        reason: format!(
                            "stream did not report ready within {}ms",
                            self.ready_timeout.as_millis()
                        ),
                    });
                }
                ReadyFallback::Proceed => {
                    warn!(
                        "{} stream not ready after {}ms, proceeding anyway",
                        kind,
                        self.ready_timeout.as_millis()
                    );
                }
            }
        }

        if session.all_tracks_ended() {
            session.close();
            return Err(CaptureError::DeviceUnavailable {
                kind,
                reason: "stream delivered no live tracks".to_string(),
            });
        }

        session.mark_open();
        info!(
            "{} session {} open ({} tracks)",
            kind,
            session.id(),
            session.tracks().len()
        );

        Ok(session)
    }

    /// List video inputs only; an empty catalog is valid
    pub async fn enumerate_video_devices(&self) -> Result<CameraCatalog> {
        let devices = self
            .platform
            .enumerate_devices()
            .await
            .map_err(CaptureError::platform)?;

        let catalog = CameraCatalog::from_devices(&devices);
        info!("Found {} cameras", catalog.len());

        Ok(catalog)
    }
}

/// Holds at most one session of a single kind
///
/// Opening a new session always fully closes the previous one first.
pub struct SessionSlot {
    kind: CaptureKind,
    session: Option<CaptureSession>,
}

impl SessionSlot {
    pub fn new(kind: CaptureKind) -> Self {
        Self {
            kind,
            session: None,
        }
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    /// Close whatever is held, then acquire a replacement
    ///
    /// On failure the slot is left empty.
    pub async fn open(
        &mut self,
        acquirer: &DeviceAcquirer,
        constraints: CaptureConstraints,
    ) -> Result<&mut CaptureSession> {
        if constraints.kind() != self.kind {
            return Err(CaptureError::InvalidConstraints(format!(
                "{} slot cannot hold a {} session",
                self.kind,
                constraints.kind()
            )));
        }

        if let Some(mut previous) = self.session.take() {
            if previous.is_open() {
                info!("Replacing {} session {}", self.kind, previous.id());
            }
            previous.close();
        }

        let session = acquirer.open_capture(self.kind, constraints).await?;
        Ok(self.session.insert(session))
    }

    pub fn get(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut CaptureSession> {
        self.session.as_mut()
    }

    pub fn is_open(&self) -> bool {
        self.session.as_ref().map(|s| s.is_open()).unwrap_or(false)
    }

    /// State of the held session; `Idle` when nothing was ever opened
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Close the held session; it stays in the slot as `Closed` until replaced
    pub fn close(&mut self) -> CloseReport {
        match self.session.as_mut() {
            Some(session) => session.close(),
            None => CloseReport::default(),
        }
    }
}
