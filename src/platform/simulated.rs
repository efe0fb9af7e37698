// In-memory media platform
//
// Scriptable stand-in for real hardware: devices, permission failures,
// ready-signal timing, encoder chunk scripts, analyser levels and track
// failures are all controlled by the caller. Every acquisition and track
// stop is written to an event log so ordering can be asserted.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{
    AcquireError, CapturedFrame, DeviceInfo, DeviceKind, FrequencyAnalyser, MediaEncoder,
    MediaPlatform, MediaStream, MediaTrack, StreamRequest, TrackState, VideoSource,
};
use crate::capture::{CaptureKind, FacingMode};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Something observable that happened on the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// A stream was granted for the given device
    StreamOpened { stream_id: String, device_id: String },
    /// A track transitioned to `Ended` through `stop`
    TrackStopped { track_id: String },
    /// A track ended without anyone calling `stop`
    TrackLost { track_id: String },
}

type EventLog = Arc<Mutex<Vec<PlatformEvent>>>;

/// How a simulated stream reports readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyBehavior {
    Immediate,
    After(Duration),
    Never,
}

/// A stoppable simulated track
pub struct SimulatedTrack {
    id: String,
    kind: CaptureKind,
    label: String,
    device_id: Option<String>,
    ended: AtomicBool,
    fail_stop: AtomicBool,
    stop_calls: AtomicUsize,
    events: Option<EventLog>,
}

impl SimulatedTrack {
    pub fn new(id: impl Into<String>, kind: CaptureKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            device_id: None,
            ended: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
            events: None,
        }
    }

    fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Report `device_id` as the source of this track
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Make every subsequent `stop` call fail (the track stays live)
    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Simulate the hardware disappearing (unplug, OS revocation)
    pub fn end_unexpectedly(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            info!("Simulated track '{}' lost", self.label);
            if let Some(events) = &self.events {
                lock(events).push(PlatformEvent::TrackLost {
                    track_id: self.id.clone(),
                });
            }
        }
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl MediaTrack for SimulatedTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> CaptureKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_stop.load(Ordering::SeqCst) {
            bail!("Simulated stop failure on track '{}'", self.id);
        }

        if !self.ended.swap(true, Ordering::SeqCst) {
            if let Some(events) = &self.events {
                lock(events).push(PlatformEvent::TrackStopped {
                    track_id: self.id.clone(),
                });
            }
        }

        Ok(())
    }
}

/// A simulated hardware stream
pub struct SimulatedStream {
    id: String,
    device_id: String,
    tracks: Vec<Arc<SimulatedTrack>>,
    ready: ReadyBehavior,
}

impl SimulatedStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<SimulatedTrack>>) -> Self {
        Self {
            id: id.into(),
            device_id: String::new(),
            tracks,
            ready: ReadyBehavior::Immediate,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn simulated_tracks(&self) -> &[Arc<SimulatedTrack>] {
        &self.tracks
    }
}

#[async_trait]
impl MediaStream for SimulatedStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|track| Arc::clone(track) as Arc<dyn MediaTrack>)
            .collect()
    }

    async fn ready(&self) {
        match self.ready {
            ReadyBehavior::Immediate => {}
            ReadyBehavior::After(delay) => tokio::time::sleep(delay).await,
            ReadyBehavior::Never => std::future::pending::<()>().await,
        }
    }
}

#[derive(Clone)]
struct SimulatedDevice {
    info: DeviceInfo,
    facing: Option<FacingMode>,
}

/// Shared state between the platform and the encoder it handed out
#[derive(Default)]
struct EncoderScript {
    /// Chunks delivered as soon as the encoder starts
    queued: VecDeque<Vec<u8>>,
    /// Chunk flushed when stop is requested
    final_chunk: Option<Vec<u8>>,
    /// Sender of the currently running encoder
    sender: Option<mpsc::Sender<Vec<u8>>>,
}

struct SimulatedEncoder {
    mime_type: String,
    script: Arc<Mutex<EncoderScript>>,
    fail_start: bool,
}

impl MediaEncoder for SimulatedEncoder {
    fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.fail_start {
            bail!("Simulated encoder failed to start");
        }

        debug!("Simulated encoder started ({}ms timeslice)", timeslice.as_millis());

        let (tx, rx) = mpsc::channel(256);
        let mut script = lock(&self.script);
        while let Some(chunk) = script.queued.pop_front() {
            if tx.try_send(chunk).is_err() {
                bail!("Simulated encoder channel full");
            }
        }
        script.sender = Some(tx);

        Ok(rx)
    }

    fn stop(&mut self) -> Result<()> {
        let mut script = lock(&self.script);
        if let Some(tx) = script.sender.take() {
            if let Some(chunk) = script.final_chunk.take() {
                if tx.try_send(chunk).is_err() {
                    bail!("Simulated encoder could not flush its final chunk");
                }
            }
            // Dropping the sender closes the chunk channel
        }
        Ok(())
    }
}

struct SimulatedAnalyser {
    bins: usize,
    level: Arc<AtomicU8>,
    closed: AtomicBool,
}

impl FrequencyAnalyser for SimulatedAnalyser {
    fn bin_count(&self) -> usize {
        self.bins
    }

    fn frequency_data(&self) -> Option<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(vec![self.level.load(Ordering::SeqCst); self.bins])
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Scriptable in-memory platform
pub struct SimulatedPlatform {
    devices: Mutex<Vec<SimulatedDevice>>,
    failures: Mutex<HashMap<CaptureKind, AcquireError>>,
    ready: Mutex<ReadyBehavior>,
    supported_mime_types: Mutex<Vec<String>>,
    default_mime_type: Mutex<String>,
    fail_encoder_start: AtomicBool,
    reports_device_ids: AtomicBool,
    encoder_script: Arc<Mutex<EncoderScript>>,
    level: Arc<AtomicU8>,
    frame_size: Mutex<(u32, u32)>,
    streams: Mutex<Vec<Arc<SimulatedStream>>>,
    requests: Mutex<Vec<StreamRequest>>,
    events: EventLog,
    next_id: AtomicUsize,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    /// Empty platform: no devices, every encoding supported, instant readiness
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            ready: Mutex::new(ReadyBehavior::Immediate),
            supported_mime_types: Mutex::new(vec![
                "audio/webm;codecs=opus".to_string(),
                "audio/webm".to_string(),
                "audio/mp4".to_string(),
            ]),
            default_mime_type: Mutex::new("audio/webm".to_string()),
            fail_encoder_start: AtomicBool::new(false),
            reports_device_ids: AtomicBool::new(true),
            encoder_script: Arc::new(Mutex::new(EncoderScript::default())),
            level: Arc::new(AtomicU8::new(0)),
            frame_size: Mutex::new((640, 480)),
            streams: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Platform with one microphone and a front/back camera pair
    pub fn with_default_devices() -> Self {
        let platform = Self::new();
        platform.add_microphone("mic-0", "Built-in Microphone");
        platform.add_camera("cam-front", "Front Camera", FacingMode::User);
        platform.add_camera("cam-back", "Back Camera", FacingMode::Environment);
        platform
    }

    pub fn add_microphone(&self, id: &str, label: &str) {
        lock(&self.devices).push(SimulatedDevice {
            info: DeviceInfo {
                id: id.to_string(),
                label: label.to_string(),
                kind: DeviceKind::AudioInput,
            },
            facing: None,
        });
    }

    pub fn add_camera(&self, id: &str, label: &str, facing: FacingMode) {
        lock(&self.devices).push(SimulatedDevice {
            info: DeviceInfo {
                id: id.to_string(),
                label: label.to_string(),
                kind: DeviceKind::VideoInput,
            },
            facing: Some(facing),
        });
    }

    /// Make every request of `kind` fail with `error` (None clears it)
    pub fn set_failure(&self, kind: CaptureKind, error: Option<AcquireError>) {
        let mut failures = lock(&self.failures);
        match error {
            Some(error) => {
                failures.insert(kind, error);
            }
            None => {
                failures.remove(&kind);
            }
        }
    }

    pub fn set_ready_behavior(&self, behavior: ReadyBehavior) {
        *lock(&self.ready) = behavior;
    }

    pub fn set_supported_mime_types(&self, types: &[&str]) {
        *lock(&self.supported_mime_types) = types.iter().map(|t| t.to_string()).collect();
    }

    /// MIME type reported when the encoder is created without a preference
    pub fn set_default_mime_type(&self, mime_type: &str) {
        *lock(&self.default_mime_type) = mime_type.to_string();
    }

    pub fn fail_encoder_start(&self, fail: bool) {
        self.fail_encoder_start.store(fail, Ordering::SeqCst);
    }

    /// Whether new tracks report the id of their device (on by default)
    pub fn set_reports_device_ids(&self, report: bool) {
        self.reports_device_ids.store(report, Ordering::SeqCst);
    }

    /// Chunks the next encoder delivers immediately on start, in order
    pub fn queue_chunks(&self, chunks: Vec<Vec<u8>>) {
        lock(&self.encoder_script).queued.extend(chunks);
    }

    /// Chunk the next encoder flushes when stopped
    pub fn set_final_chunk(&self, chunk: Vec<u8>) {
        lock(&self.encoder_script).final_chunk = Some(chunk);
    }

    /// Push a chunk through the running encoder; false if none is running
    pub fn emit_chunk(&self, chunk: Vec<u8>) -> bool {
        match &lock(&self.encoder_script).sender {
            Some(tx) => tx.try_send(chunk).is_ok(),
            None => false,
        }
    }

    /// Byte magnitude reported in every frequency bin
    pub fn set_level(&self, magnitude: u8) {
        self.level.store(magnitude, Ordering::SeqCst);
    }

    pub fn set_frame_size(&self, width: u32, height: u32) {
        *lock(&self.frame_size) = (width, height);
    }

    /// Every stream ever granted, in order
    pub fn streams(&self) -> Vec<Arc<SimulatedStream>> {
        lock(&self.streams).clone()
    }

    pub fn last_stream(&self) -> Option<Arc<SimulatedStream>> {
        lock(&self.streams).last().cloned()
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        lock(&self.requests).clone()
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        lock(&self.events).clone()
    }

    /// Hand out a stream nobody registered (as if another component leaked it)
    pub fn open_untracked_stream(&self, kind: CaptureKind) -> Arc<SimulatedStream> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let track = SimulatedTrack::new(format!("track-{}", n), kind, "Untracked")
            .with_events(Arc::clone(&self.events));
        let stream = Arc::new(SimulatedStream {
            id: format!("stream-{}", n),
            device_id: "untracked".to_string(),
            tracks: vec![Arc::new(track)],
            ready: ReadyBehavior::Immediate,
        });
        lock(&self.streams).push(Arc::clone(&stream));
        stream
    }

    fn select_device(&self, request: &StreamRequest) -> Result<SimulatedDevice, AcquireError> {
        let devices = lock(&self.devices);

        match request {
            StreamRequest::Audio { .. } => devices
                .iter()
                .find(|d| d.info.kind == DeviceKind::AudioInput)
                .cloned()
                .ok_or(AcquireError::NotFound),
            StreamRequest::Video { source, .. } => {
                let mut cameras = devices.iter().filter(|d| d.info.kind == DeviceKind::VideoInput);
                match source {
                    VideoSource::ExactDevice(id) => cameras
                        .find(|d| &d.info.id == id)
                        .cloned()
                        .ok_or_else(|| {
                            AcquireError::Overconstrained(format!("no camera with id '{}'", id))
                        }),
                    VideoSource::Facing(mode) => {
                        let cameras: Vec<_> = cameras.collect();
                        // Facing mode is a preference, not a hard requirement
                        cameras
                            .iter()
                            .find(|d| d.facing == Some(*mode))
                            .or_else(|| cameras.first())
                            .map(|d| (*d).clone())
                            .ok_or(AcquireError::NotFound)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MediaPlatform for SimulatedPlatform {
    async fn request_media_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<Arc<dyn MediaStream>, AcquireError> {
        lock(&self.requests).push(request.clone());

        if let Some(error) = lock(&self.failures).get(&request.kind()).cloned() {
            debug!("Simulated {} request rejected: {}", request.kind(), error);
            return Err(error);
        }

        let device = self.select_device(request)?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stream_id = format!("stream-{}", n);

        let mut track = SimulatedTrack::new(
            format!("{}-track-{}", device.info.id, n),
            request.kind(),
            device.info.label.clone(),
        )
        .with_events(Arc::clone(&self.events));
        if self.reports_device_ids.load(Ordering::SeqCst) {
            track = track.with_device_id(device.info.id.clone());
        }

        let stream = Arc::new(SimulatedStream {
            id: stream_id.clone(),
            device_id: device.info.id.clone(),
            tracks: vec![Arc::new(track)],
            ready: *lock(&self.ready),
        });

        lock(&self.streams).push(Arc::clone(&stream));
        lock(&self.events).push(PlatformEvent::StreamOpened {
            stream_id,
            device_id: device.info.id,
        });

        Ok(stream)
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(lock(&self.devices).iter().map(|d| d.info.clone()).collect())
    }

    fn is_encoding_supported(&self, mime_type: &str) -> bool {
        lock(&self.supported_mime_types).iter().any(|t| t == mime_type)
    }

    fn create_encoder(
        &self,
        _stream: Arc<dyn MediaStream>,
        mime_type: Option<&str>,
    ) -> Result<Box<dyn MediaEncoder>> {
        let mime_type = match mime_type {
            Some(mime_type) => mime_type.to_string(),
            None => lock(&self.default_mime_type).clone(),
        };

        Ok(Box::new(SimulatedEncoder {
            mime_type,
            script: Arc::clone(&self.encoder_script),
            fail_start: self.fail_encoder_start.load(Ordering::SeqCst),
        }))
    }

    fn create_analyser(
        &self,
        _stream: Arc<dyn MediaStream>,
        fft_size: usize,
    ) -> Result<Arc<dyn FrequencyAnalyser>> {
        Ok(Arc::new(SimulatedAnalyser {
            bins: (fft_size / 2).max(1),
            level: Arc::clone(&self.level),
            closed: AtomicBool::new(false),
        }))
    }

    async fn grab_frame(&self, stream: Arc<dyn MediaStream>) -> Result<CapturedFrame> {
        if !stream.is_live() {
            bail!("Cannot grab a frame from a stopped stream");
        }

        let (width, height) = *lock(&self.frame_size);
        // SOI + EOI markers stand in for real JPEG data
        Ok(CapturedFrame {
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width,
            height,
        })
    }

    fn active_streams(&self) -> Vec<Arc<dyn MediaStream>> {
        lock(&self.streams)
            .iter()
            .filter(|stream| stream.is_live())
            .map(|stream| Arc::clone(stream) as Arc<dyn MediaStream>)
            .collect()
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
