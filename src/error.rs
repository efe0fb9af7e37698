//! Error types for the capture manager
//!
//! Library operations return `CaptureError`; application glue (CLI, config,
//! file I/O) uses `anyhow`.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::capture::CaptureKind;

/// Errors surfaced by acquisition, recording and teardown
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("{kind} device unavailable: {reason}")]
    DeviceUnavailable { kind: CaptureKind, reason: String },

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No active recording to stop")]
    NoActiveRecording,

    #[error("{kind} capture lost: track '{track}' ended unexpectedly")]
    CaptureLost { kind: CaptureKind, track: String },

    #[error("No audio was captured. Check your microphone.")]
    EmptyRecording,

    #[error("Invalid capture constraints: {0}")]
    InvalidConstraints(String),

    #[error("No camera is open")]
    NoCameraOpen,

    #[error("Capture session is not open")]
    SessionClosed,

    #[error("Captured frame has invalid dimensions {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Payload-free error discriminant reported to the host observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    DeviceUnavailable,
    AlreadyRecording,
    NoActiveRecording,
    CaptureLost,
    EmptyRecording,
    InvalidConstraints,
    NoCameraOpen,
    SessionClosed,
    InvalidFrame,
    Platform,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            CaptureError::AlreadyRecording => ErrorKind::AlreadyRecording,
            CaptureError::NoActiveRecording => ErrorKind::NoActiveRecording,
            CaptureError::CaptureLost { .. } => ErrorKind::CaptureLost,
            CaptureError::EmptyRecording => ErrorKind::EmptyRecording,
            CaptureError::InvalidConstraints(_) => ErrorKind::InvalidConstraints,
            CaptureError::NoCameraOpen => ErrorKind::NoCameraOpen,
            CaptureError::SessionClosed => ErrorKind::SessionClosed,
            CaptureError::InvalidFrame { .. } => ErrorKind::InvalidFrame,
            CaptureError::Platform(_) => ErrorKind::Platform,
        }
    }

    pub(crate) fn platform(err: anyhow::Error) -> Self {
        CaptureError::Platform(format!("{:#}", err))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result type alias using CaptureError
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_message_names_kind() {
        let err = CaptureError::DeviceUnavailable {
            kind: CaptureKind::Video,
            reason: "permission denied".to_string(),
        };

        assert_eq!(err.to_string(), "video device unavailable: permission denied");
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
    }

    #[test]
    fn test_platform_error_keeps_context_chain() {
        let err = anyhow::anyhow!("encoder crashed").context("Failed to start encoder");
        let err = CaptureError::platform(err);

        assert_eq!(
            err.to_string(),
            "Platform error: Failed to start encoder: encoder crashed"
        );
    }
}
