use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::artifact::{negotiate_mime_type, RecordingArtifact};
use super::chunk::ChunkBuffer;
use super::state::RecorderState;
use crate::analysis::{AudioLevelSample, LevelMonitor, Quality};
use crate::capture::{
    CaptureConstraints, CaptureKind, DeviceAcquirer, SessionSlot, SessionState, TrackWatchdog,
};
use crate::config::{AudioSettings, QualitySettings};
use crate::error::{CaptureError, Result};
use crate::observer::CaptureObserver;
use crate::platform::MediaEncoder;

/// Everything alive while a recording runs
struct ActiveRecording {
    session_id: Uuid,
    encoder: Box<dyn MediaEncoder>,
    mime_type: String,
    chunks: ChunkBuffer,
    collector: JoinHandle<usize>,
    levels: LevelMonitor,
    watchdog: TrackWatchdog,
    started_at: Instant,
}

impl ActiveRecording {
    fn elapsed_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

struct RecorderCore {
    state: RecorderState,
    slot: SessionSlot,
    active: Option<ActiveRecording>,
}

impl RecorderCore {
    /// Stop everything without producing an artifact
    fn discard(&mut self) -> bool {
        let discarded = match self.active.take() {
            Some(mut active) => {
                info!(
                    "Discarding recording after {}s ({} chunks)",
                    active.elapsed_seconds(),
                    active.chunks.len()
                );
                if let Err(e) = active.encoder.stop() {
                    warn!("Encoder stop failed during discard: {:#}", e);
                }
                active.collector.abort();
                active.levels.stop();
                active.watchdog.stop();
                true
            }
            None => false,
        };

        self.slot.close();
        self.state = RecorderState::Idle;
        discarded
    }
}

/// Audio recording state machine
///
/// Owns exactly one microphone slot. `start` acquires the microphone and
/// starts chunked encoding, level sampling and a track watchdog; `stop`
/// flushes, tears down and returns the artifact; `dispose` tears down and
/// throws the audio away.
pub struct AudioRecorder {
    core: Arc<Mutex<RecorderCore>>,
    acquirer: DeviceAcquirer,
    settings: AudioSettings,
    quality: QualitySettings,
    watchdog_interval: Duration,
    observer: Arc<dyn CaptureObserver>,
}

impl AudioRecorder {
    pub fn new(
        acquirer: DeviceAcquirer,
        settings: AudioSettings,
        quality: QualitySettings,
        watchdog_interval: Duration,
        observer: Arc<dyn CaptureObserver>,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(RecorderCore {
                state: RecorderState::Idle,
                slot: SessionSlot::new(CaptureKind::Audio),
                active: None,
            })),
            acquirer,
            settings,
            quality,
            watchdog_interval,
            observer,
        }
    }

    pub async fn state(&self) -> RecorderState {
        self.core.lock().await.state
    }

    pub async fn is_recording(&self) -> bool {
        self.core.lock().await.state.is_recording()
    }

    /// State of the microphone session (the last one, once closed)
    pub async fn session_state(&self) -> SessionState {
        self.core.lock().await.slot.state()
    }

    /// Whole seconds since `start`; 0 when idle
    pub async fn elapsed_seconds(&self) -> u64 {
        let core = self.core.lock().await;
        core.active.as_ref().map(|a| a.elapsed_seconds()).unwrap_or(0)
    }

    pub async fn latest_level(&self) -> AudioLevelSample {
        let core = self.core.lock().await;
        core.active
            .as_ref()
            .map(|a| a.levels.latest())
            .unwrap_or(AudioLevelSample::SILENT)
    }

    /// Live quality verdict; `None` when idle
    pub async fn quality(&self) -> Option<Quality> {
        let core = self.core.lock().await;
        core.active.as_ref().map(|a| a.levels.quality())
    }

    /// Idle → Acquiring → Recording
    pub async fn start(&self) -> Result<()> {
        let mut core = self.core.lock().await;

        if !core.state.is_idle() {
            warn!("Recording already started");
            return Err(CaptureError::AlreadyRecording);
        }

        core.state = RecorderState::Acquiring;
        info!("Starting audio recording");

        match self.begin(&mut core).await {
            Ok(active) => {
                info!(
                    "Recording started (session {}, {})",
                    active.session_id,
                    if active.mime_type.is_empty() {
                        "platform default encoding"
                    } else {
                        active.mime_type.as_str()
                    }
                );
                core.active = Some(active);
                core.state = RecorderState::Recording;
                Ok(())
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                core.slot.close();
                core.state = RecorderState::Idle;
                Err(e)
            }
        }
    }

    async fn begin(&self, core: &mut RecorderCore) -> Result<ActiveRecording> {
        let constraints = CaptureConstraints::Audio(self.settings.constraints.clone());
        let session = core.slot.open(&self.acquirer, constraints).await?;
        let stream = session.stream().ok_or(CaptureError::SessionClosed)?;
        let platform = self.acquirer.platform();

        let analyser = platform
            .create_analyser(Arc::clone(&stream), self.settings.fft_size)
            .map_err(CaptureError::platform)?;
        session.attach_analyser(Arc::clone(&analyser));

        let preferred = negotiate_mime_type(platform.as_ref(), &self.settings.preferred_mime_types);
        if preferred.is_none() {
            debug!("No preferred encoding supported, letting the platform choose");
        }

        let mut encoder = platform
            .create_encoder(Arc::clone(&stream), preferred.as_deref())
            .map_err(CaptureError::platform)?;
        let chunk_rx = encoder
            .start(self.settings.timeslice())
            .map_err(CaptureError::platform)?;
        let mime_type = encoder.mime_type();

        let chunks = ChunkBuffer::new();
        let collector = chunks.spawn_collector(chunk_rx);

        let observer = Arc::clone(&self.observer);
        let levels = LevelMonitor::spawn(
            analyser,
            self.settings.level_interval(),
            self.quality.clone(),
            move |sample| observer.on_level_update(sample),
        );

        let session_id = session.id();
        let watchdog = TrackWatchdog::spawn(
            CaptureKind::Audio,
            session.tracks().to_vec(),
            self.watchdog_interval,
            self.loss_handler(session_id),
        );

        Ok(ActiveRecording {
            session_id,
            encoder,
            mime_type,
            chunks,
            collector,
            levels,
            watchdog,
            started_at: Instant::now(),
        })
    }

    /// Teardown for a microphone that disappeared mid-recording
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
                    let current = core.active.as_ref().map(|a| a.session_id);
                    if current != Some(session_id) {
                        debug!("Ignoring loss report for finished session {}", session_id);
                        return;
                    }

                    error!("Recording aborted: {}", err);
                    core.discard();
                }

                observer.on_error(err.kind(), err.to_string());
            }
            .boxed()
        }
    }

    /// Recording → Stopping → Idle
    ///
    /// Waits for the encoder to flush so every chunk emitted before the stop
    /// request is in the artifact. The microphone is released on every path.
    pub async fn stop(&self) -> Result<RecordingArtifact> {
        let mut core = self.core.lock().await;

        if !core.state.is_recording() {
            return Err(CaptureError::NoActiveRecording);
        }

        let Some(mut active) = core.active.take() else {
            core.state = RecorderState::Idle;
            return Err(CaptureError::NoActiveRecording);
        };

        core.state = RecorderState::Stopping;
        let duration_seconds = active.elapsed_seconds();
        info!("Stopping recording after {}s", duration_seconds);

        if let Err(e) = active.encoder.stop() {
            warn!("Encoder stop failed, keeping chunks collected so far: {:#}", e);
        }

        match tokio::time::timeout(self.settings.finalize_timeout(), &mut active.collector).await {
            Ok(Ok(count)) => debug!("Collector finished with {} chunks", count),
            Ok(Err(e)) => error!("Chunk collector task failed: {}", e),
            Err(_) => {
                warn!(
                    "Encoder did not finish within {}ms, using chunks received so far",
                    self.settings.finalize_timeout_ms
                );
                active.collector.abort();
            }
        }

        active.levels.stop();
        active.watchdog.stop();
        core.slot.close();
        core.state = RecorderState::Idle;

        let artifact =
            RecordingArtifact::assemble(&active.chunks, &active.mime_type, duration_seconds)
                .ok_or(CaptureError::EmptyRecording)?;

        info!(
            "Recording complete: {} bytes, {} chunks, {}s ({})",
            artifact.data().len(),
            artifact.chunk_count(),
            artifact.duration_seconds(),
            artifact.mime_type()
        );

        Ok(artifact)
    }

    /// Stop-and-discard; returns true if a recording was thrown away
    pub async fn dispose(&self) -> bool {
        let mut core = self.core.lock().await;
        let discarded = core.discard();
        if discarded {
            info!("Recorder disposed mid-recording, audio discarded");
        }
        discarded
    }
}
