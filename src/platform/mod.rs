//! Host platform capabilities consumed by the capture manager
//!
//! Everything that touches real hardware lives behind these traits:
//! - `MediaPlatform`: stream acquisition, device enumeration, encoders, analysers
//! - `MediaStream` / `MediaTrack`: an open hardware stream and its stoppable lines
//! - `MediaEncoder`: turns a stream into ordered binary chunks
//! - `FrequencyAnalyser`: frequency-domain snapshots of a live stream
//! - `PreviewSurface`: a consumer the stream can be lent to
//!
//! Implementations:
//! - `SimulatedPlatform`: scriptable in-memory devices (tests, demos)
//! - `FilePlatform`: a virtual microphone backed by an audio file

pub mod file;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::capture::{CaptureKind, FacingMode};

pub use file::FilePlatform;
pub use simulated::{PlatformEvent, ReadyBehavior, SimulatedPlatform, SimulatedTrack};

/// Ready state of a single track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Track is delivering data and holds the hardware
    Live,
    /// Track has been stopped (by us or by the platform)
    Ended,
}

/// Kind of input device reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// One entry from device enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// Which camera a video request targets
///
/// An exact device id and a facing mode are never sent together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Facing(FacingMode),
    ExactDevice(String),
}

/// Platform-level stream request built from capture constraints
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequest {
    Audio {
        echo_cancellation: bool,
        noise_suppression: bool,
        auto_gain_control: bool,
        sample_rate: Option<u32>,
    },
    Video {
        ideal_width: u32,
        ideal_height: u32,
        max_width: u32,
        max_height: u32,
        source: VideoSource,
    },
}

impl StreamRequest {
    pub fn kind(&self) -> CaptureKind {
        match self {
            StreamRequest::Audio { .. } => CaptureKind::Audio,
            StreamRequest::Video { .. } => CaptureKind::Video,
        }
    }
}

/// Failures reported by the platform while acquiring a stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no matching device found")]
    NotFound,

    #[error("constraints cannot be satisfied: {0}")]
    Overconstrained(String),

    #[error("{0}")]
    Other(String),
}

/// A still image grabbed from an open video stream
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// JPEG-encoded image bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One independently stoppable media line
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> CaptureKind;

    /// Device label, used for logging
    fn label(&self) -> &str;

    /// Id of the device feeding this track, when the platform reports it
    fn device_id(&self) -> Option<&str> {
        None
    }

    fn ready_state(&self) -> TrackState;

    /// Stop the track and release its hardware
    fn stop(&self) -> anyhow::Result<()>;
}

/// An open hardware stream
#[async_trait]
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    /// Tracks in the order the platform reported them
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    /// Resolves once the stream reports it is ready to deliver data
    async fn ready(&self);

    /// True while any track is still live
    fn is_live(&self) -> bool {
        self.tracks()
            .iter()
            .any(|track| track.ready_state() == TrackState::Live)
    }
}

/// Encoder that turns a stream into ordered binary chunks
///
/// `start` hands back the receiving end of the chunk channel. After `stop`
/// the encoder flushes any pending data and drops the sender; channel
/// closure is the "stopped" signal.
pub trait MediaEncoder: Send {
    /// Negotiated MIME type (may be empty if the platform does not report one)
    fn mime_type(&self) -> String;

    /// Start emitting a chunk every `timeslice`
    fn start(&mut self, timeslice: Duration) -> anyhow::Result<mpsc::Receiver<Vec<u8>>>;

    /// Request a final flush and close the chunk channel
    fn stop(&mut self) -> anyhow::Result<()>;
}

/// Frequency-domain analysis over a live stream
pub trait FrequencyAnalyser: Send + Sync {
    /// Number of frequency bins in a snapshot
    fn bin_count(&self) -> usize;

    /// Current byte magnitudes per bin, or `None` once the analyser is closed
    fn frequency_data(&self) -> Option<Vec<u8>>;

    fn close(&self);
}

/// A consumer the stream can be lent to (e.g. a live preview)
pub trait PreviewSurface: Send + Sync {
    fn attach(&self, stream: Arc<dyn MediaStream>);

    fn detach(&self);
}

/// Host platform capability contract
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Request hardware access matching the given constraints
    async fn request_media_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<Arc<dyn MediaStream>, AcquireError>;

    /// List every input/output device the platform knows about
    async fn enumerate_devices(&self) -> anyhow::Result<Vec<DeviceInfo>>;

    /// Whether the encoder supports the given MIME type
    fn is_encoding_supported(&self, mime_type: &str) -> bool;

    /// Create an encoder for the stream; `None` lets the platform choose
    fn create_encoder(
        &self,
        stream: Arc<dyn MediaStream>,
        mime_type: Option<&str>,
    ) -> anyhow::Result<Box<dyn MediaEncoder>>;

    /// Create a frequency analyser with the given FFT size
    fn create_analyser(
        &self,
        stream: Arc<dyn MediaStream>,
        fft_size: usize,
    ) -> anyhow::Result<Arc<dyn FrequencyAnalyser>>;

    /// Grab a still frame from an open video stream
    async fn grab_frame(&self, stream: Arc<dyn MediaStream>) -> anyhow::Result<CapturedFrame>;

    /// Every stream the platform currently holds open, known to us or not
    fn active_streams(&self) -> Vec<Arc<dyn MediaStream>>;

    /// Platform name for logging
    fn name(&self) -> &str;
}
