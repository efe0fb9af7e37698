//! Recorder states
//!
//! Idle → Acquiring → Recording → Stopping → Idle

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RecorderState {
    /// No microphone held
    #[default]
    Idle,

    /// Waiting for the platform to grant the microphone
    Acquiring,

    /// Encoder running, chunks being collected
    Recording,

    /// Final chunks being flushed, teardown in progress
    Stopping,
}

impl RecorderState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RecorderState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, RecorderState::Recording)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderState::Idle => write!(f, "Idle"),
            RecorderState::Acquiring => write!(f, "Acquiring..."),
            RecorderState::Recording => write!(f, "Recording..."),
            RecorderState::Stopping => write!(f, "Stopping..."),
        }
    }
}
