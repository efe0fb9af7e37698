use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::chunk::ChunkBuffer;
use crate::platform::MediaPlatform;

/// MIME type used when the platform does not report one
pub const FALLBACK_MIME_TYPE: &str = "audio/webm";

/// Finalized output of one recording
///
/// Immutable once built; ownership moves to whoever receives it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingArtifact {
    id: Uuid,
    #[serde(skip)]
    data: Vec<u8>,
    size_bytes: usize,
    mime_type: String,
    duration_seconds: u64,
    chunk_count: usize,
    recorded_at: DateTime<Utc>,
}

impl RecordingArtifact {
    /// Assemble from collected chunks; `None` when nothing was captured
    pub fn assemble(chunks: &ChunkBuffer, mime_type: &str, duration_seconds: u64) -> Option<Self> {
        if chunks.is_empty() {
            return None;
        }

        let data = chunks.assemble();
        let mime_type = if mime_type.trim().is_empty() {
            FALLBACK_MIME_TYPE.to_string()
        } else {
            mime_type.to_string()
        };

        Some(Self {
            id: Uuid::new_v4(),
            size_bytes: data.len(),
            data,
            mime_type,
            duration_seconds,
            chunk_count: chunks.len(),
            recorded_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Sample rate and channel count for raw PCM (`audio/L16;rate=..;channels=..`)
    pub fn pcm_format(&self) -> Option<(u32, u16)> {
        let mut parts = self.mime_type.split(';').map(str::trim);
        if !parts.next()?.eq_ignore_ascii_case("audio/L16") {
            return None;
        }

        let mut rate = None;
        let mut channels = 1;
        for part in parts {
            match part.split_once('=') {
                Some(("rate", value)) => rate = value.parse().ok(),
                Some(("channels", value)) => channels = value.parse().ok()?,
                _ => {}
            }
        }

        rate.map(|rate| (rate, channels))
    }
}

/// First supported encoding from the preference list, or `None` to let the
/// platform choose
pub fn negotiate_mime_type(platform: &dyn MediaPlatform, preferences: &[String]) -> Option<String> {
    preferences
        .iter()
        .find(|mime_type| platform.is_encoding_supported(mime_type))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;

    fn buffer(chunks: &[&[u8]]) -> ChunkBuffer {
        let buffer = ChunkBuffer::new();
        for chunk in chunks {
            buffer.push(chunk.to_vec());
        }
        buffer
    }

    #[test]
    fn test_assemble_concatenates_in_order() {
        let artifact =
            RecordingArtifact::assemble(&buffer(&[b"c1", b"c2", b"c3"]), "audio/webm", 3).unwrap();

        assert_eq!(artifact.data(), b"c1c2c3");
        assert_eq!(artifact.chunk_count(), 3);
        assert_eq!(artifact.duration_seconds(), 3);
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        assert!(RecordingArtifact::assemble(&ChunkBuffer::new(), "audio/webm", 1).is_none());
    }

    #[test]
    fn test_blank_mime_falls_back_to_webm() {
        let artifact = RecordingArtifact::assemble(&buffer(&[b"x"]), "", 0).unwrap();
        assert_eq!(artifact.mime_type(), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn test_pcm_format_parsing() {
        let artifact =
            RecordingArtifact::assemble(&buffer(&[b"x"]), "audio/L16;rate=16000;channels=2", 0)
                .unwrap();
        assert_eq!(artifact.pcm_format(), Some((16000, 2)));

        let webm = RecordingArtifact::assemble(&buffer(&[b"x"]), "audio/webm", 0).unwrap();
        assert_eq!(webm.pcm_format(), None);
    }

    #[test]
    fn test_negotiation_walks_preferences_in_order() {
        let platform = SimulatedPlatform::new();
        let preferences: Vec<String> = crate::config::DEFAULT_MIME_PREFERENCES
            .iter()
            .map(|t| t.to_string())
            .collect();

        platform.set_supported_mime_types(&["audio/mp4", "audio/webm"]);
        assert_eq!(
            negotiate_mime_type(&platform, &preferences).as_deref(),
            Some("audio/webm")
        );

        platform.set_supported_mime_types(&["audio/mp4"]);
        assert_eq!(
            negotiate_mime_type(&platform, &preferences).as_deref(),
            Some("audio/mp4")
        );

        platform.set_supported_mime_types(&[]);
        assert_eq!(negotiate_mime_type(&platform, &preferences), None);
    }
}
