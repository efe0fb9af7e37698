use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::constraints::{CaptureConstraints, CaptureKind};
use super::registry::StreamRegistry;
use crate::error::{CaptureError, Result};
use crate::platform::{FrequencyAnalyser, MediaStream, MediaTrack, PreviewSurface, TrackState};

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Acquiring,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a `close` call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub tracks_stopped: usize,
    pub failures: usize,
    /// False when the session was already closed
    pub performed: bool,
}

/// One open hardware stream and everything attached to it
///
/// Exclusively owned by the component that opened it. The stream may be lent
/// to a single preview surface, but only the owner can close it. Dropping a
/// session that is still open closes it.
pub struct CaptureSession {
    id: Uuid,
    kind: CaptureKind,
    constraints: CaptureConstraints,
    stream_id: String,
    handle: Option<Arc<dyn MediaStream>>,
    tracks: Vec<Arc<dyn MediaTrack>>,
    state: SessionState,
    preview: Option<Arc<dyn PreviewSurface>>,
    analyser: Option<Arc<dyn FrequencyAnalyser>>,
    registry: StreamRegistry,
    opened_at: DateTime<Utc>,
}

impl CaptureSession {
    /// Wrap a freshly granted stream; the session starts out `Acquiring`
    pub(crate) fn new(
        constraints: CaptureConstraints,
        stream: Arc<dyn MediaStream>,
        registry: StreamRegistry,
    ) -> Self {
        let tracks = stream.tracks();

        Self {
            id: Uuid::new_v4(),
            kind: constraints.kind(),
            constraints,
            stream_id: stream.id().to_string(),
            handle: Some(stream),
            tracks,
            state: SessionState::Acquiring,
            preview: None,
            analyser: None,
            registry,
            opened_at: Utc::now(),
        }
    }

    pub(crate) fn mark_open(&mut self) {
        if self.state == SessionState::Acquiring {
            self.state = SessionState::Open;
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// The underlying stream, or `None` once closed
    pub fn stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.handle.clone()
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// True when every track has reached `Ended`
    pub fn all_tracks_ended(&self) -> bool {
        self.tracks
            .iter()
            .all(|track| track.ready_state() == TrackState::Ended)
    }

    /// First track that ended while the session still considers itself open
    pub fn lost_track(&self) -> Option<Arc<dyn MediaTrack>> {
        if !self.is_open() {
            return None;
        }
        self.tracks
            .iter()
            .find(|track| track.ready_state() == TrackState::Ended)
            .cloned()
    }

    pub(crate) fn attach_analyser(&mut self, analyser: Arc<dyn FrequencyAnalyser>) {
        if let Some(previous) = self.analyser.replace(analyser) {
            previous.close();
        }
    }

    pub fn analyser(&self) -> Option<Arc<dyn FrequencyAnalyser>> {
        self.analyser.clone()
    }

    /// Lend the stream to a preview surface, detaching any previous borrower
    pub fn lend_preview(&mut self, surface: Arc<dyn PreviewSurface>) -> Result<()> {
        let stream = match (&self.handle, self.state) {
            (Some(stream), SessionState::Open) => Arc::clone(stream),
            _ => return Err(CaptureError::SessionClosed),
        };

        if let Some(previous) = self.preview.take() {
            previous.detach();
        }

        surface.attach(stream);
        self.preview = Some(surface);
        debug!("{} session {} lent to preview", self.kind, self.id);

        Ok(())
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Release every hardware resource held by this session
    ///
    /// Each track is stopped independently; a failing stop is logged and the
    /// remaining tracks are still attempted. Calling this on a closed session
    /// does nothing.
    pub fn close(&mut self) -> CloseReport {
        if matches!(self.state, SessionState::Closed | SessionState::Closing) {
            return CloseReport::default();
        }

        self.state = SessionState::Closing;
        info!("Closing {} session {} ({} tracks)", self.kind, self.id, self.tracks.len());

        let mut report = CloseReport {
            performed: true,
            ..CloseReport::default()
        };

        for track in &self.tracks {
            if track.ready_state() == TrackState::Ended {
                continue;
            }

            match track.stop() {
                Ok(()) => {
                    debug!("Stopped {} track '{}'", track.kind(), track.label());
                    report.tracks_stopped += 1;
                }
                Err(e) => {
                    warn!("Failed to stop track '{}': {:#}", track.label(), e);
                    report.failures += 1;
                }
            }
        }

        if let Some(analyser) = self.analyser.take() {
            analyser.close();
        }

        if let Some(preview) = self.preview.take() {
            preview.detach();
        }

        self.registry.unregister(&self.stream_id);
        self.handle = None;
        self.state = SessionState::Closed;

        info!(
            "{} session {} closed ({} tracks stopped, {} failures)",
            self.kind, self.id, report.tracks_stopped, report.failures
        );

        report
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .field("state", &self.state)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if !matches!(self.state, SessionState::Closed | SessionState::Idle) {
            warn!("{} session {} dropped while {}, closing", self.kind, self.id, self.state);
            self.close();
        }
    }
}
