use serde::{Deserialize, Serialize};
use std::fmt;

use crate::platform::{StreamRequest, VideoSource};

/// Kind of hardware stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Microphone input
    Audio,
    /// Camera input
    Video,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKind::Audio => write!(f, "audio"),
            CaptureKind::Video => write!(f, "video"),
        }
    }
}

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera
    User,
    /// Back camera
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}

/// Camera selection: either by facing mode or by an exact device id, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraSelector {
    FacingMode(FacingMode),
    DeviceId(String),
}

impl Default for CameraSelector {
    fn default() -> Self {
        CameraSelector::FacingMode(FacingMode::Environment)
    }
}

/// Microphone constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Fixed sample rate; `None` accepts the device default
    pub sample_rate: Option<u32>,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: Some(44100),
        }
    }
}

/// Camera constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub source: CameraSelector,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1920,
            ideal_height: 1080,
            max_width: 1920,
            max_height: 1080,
            source: CameraSelector::default(),
        }
    }
}

impl VideoConstraints {
    /// Same resolution, targeting a specific device
    pub fn with_device(&self, device_id: impl Into<String>) -> Self {
        Self {
            source: CameraSelector::DeviceId(device_id.into()),
            ..self.clone()
        }
    }

    /// Same resolution, targeting a facing mode
    pub fn with_facing_mode(&self, mode: FacingMode) -> Self {
        Self {
            source: CameraSelector::FacingMode(mode),
            ..self.clone()
        }
    }
}

/// Constraints for one capture request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CaptureConstraints {
    Audio(AudioConstraints),
    Video(VideoConstraints),
}

impl CaptureConstraints {
    pub fn kind(&self) -> CaptureKind {
        match self {
            CaptureConstraints::Audio(_) => CaptureKind::Audio,
            CaptureConstraints::Video(_) => CaptureKind::Video,
        }
    }

    /// Translate into the platform request shape
    pub fn to_request(&self) -> StreamRequest {
        match self {
            CaptureConstraints::Audio(audio) => StreamRequest::Audio {
                echo_cancellation: audio.echo_cancellation,
                noise_suppression: audio.noise_suppression,
                auto_gain_control: audio.auto_gain_control,
                sample_rate: audio.sample_rate,
            },
            CaptureConstraints::Video(video) => StreamRequest::Video {
                ideal_width: video.ideal_width,
                ideal_height: video.ideal_height,
                max_width: video.max_width,
                max_height: video.max_height,
                source: match &video.source {
                    CameraSelector::FacingMode(mode) => VideoSource::Facing(*mode),
                    CameraSelector::DeviceId(id) => VideoSource::ExactDevice(id.clone()),
                },
            },
        }
    }
}

impl From<AudioConstraints> for CaptureConstraints {
    fn from(value: AudioConstraints) -> Self {
        CaptureConstraints::Audio(value)
    }
}

impl From<VideoConstraints> for CaptureConstraints {
    fn from(value: VideoConstraints) -> Self {
        CaptureConstraints::Video(value)
    }
}
