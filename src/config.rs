use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::{AudioConstraints, CameraSelector, FacingMode, VideoConstraints};

/// Encodings probed in order before falling back to the platform default
pub const DEFAULT_MIME_PREFERENCES: [&str; 3] = ["audio/webm;codecs=opus", "audio/webm", "audio/mp4"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureSettings,
    pub audio: AudioSettings,
    pub video: VideoSettings,
    pub quality: QualitySettings,
}

/// What to do when a stream never reports ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyFallback {
    /// Close the stream and report the device as unavailable
    Fail,
    /// Log a warning and treat the stream as open
    Proceed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub ready_timeout_ms: u64,
    pub ready_fallback: ReadyFallback,
    pub watchdog_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 2000,
            ready_fallback: ReadyFallback::Fail,
            watchdog_interval_ms: 1000,
        }
    }
}

impl CaptureSettings {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub constraints: AudioConstraints,
    /// Encoder timeslice; chunks are requested at least this often
    pub timeslice_ms: u64,
    /// Level sampling cadence
    pub level_interval_ms: u64,
    pub fft_size: usize,
    /// Upper bound on waiting for the encoder's final chunk
    pub finalize_timeout_ms: u64,
    pub preferred_mime_types: Vec<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            constraints: AudioConstraints::default(),
            timeslice_ms: 100,
            level_interval_ms: 100,
            fft_size: 256,
            finalize_timeout_ms: 5000,
            preferred_mime_types: DEFAULT_MIME_PREFERENCES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl AudioSettings {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }

    pub fn level_interval(&self) -> Duration {
        Duration::from_millis(self.level_interval_ms.max(1))
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub facing_mode: FacingMode,
}

impl Default for VideoSettings {
    fn default() -> Self {
        let defaults = VideoConstraints::default();
        Self {
            ideal_width: defaults.ideal_width,
            ideal_height: defaults.ideal_height,
            max_width: defaults.max_width,
            max_height: defaults.max_height,
            facing_mode: FacingMode::Environment,
        }
    }
}

impl VideoSettings {
    pub fn constraints(&self) -> VideoConstraints {
        VideoConstraints {
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
            max_width: self.max_width,
            max_height: self.max_height,
            source: CameraSelector::FacingMode(self.facing_mode),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Levels below this are "too quiet"
    pub quiet_threshold: f32,
    /// Levels above this are "too loud"
    pub loud_threshold: f32,
    pub min_duration_secs: f64,
    /// Number of trailing samples a verdict is based on
    pub window: usize,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            quiet_threshold: 0.1,
            loud_threshold: 0.8,
            min_duration_secs: 2.0,
            window: 10,
        }
    }
}

impl Config {
    /// Load from a file (required) plus `MEDCAPTURE__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        Self::build(path, true)
    }

    /// Like `load`, but a missing file falls back to defaults
    pub fn load_or_default(path: &str) -> Result<Self> {
        Self::build(path, false)
    }

    fn build(path: &str, required: bool) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix("MEDCAPTURE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid capture configuration")
    }
}
