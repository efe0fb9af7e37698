use anyhow::{anyhow, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use tracing::info;

use crate::recording::RecordingArtifact;

/// Write a raw PCM artifact (`audio/L16`) to a WAV file
///
/// Other encodings are already containerized and are written as-is by the
/// caller; this rejects them.
pub fn write_pcm_wav(artifact: &RecordingArtifact, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let (sample_rate, channels) = artifact.pcm_format().ok_or_else(|| {
        anyhow!(
            "Artifact is {}, only audio/L16 can be written as WAV",
            artifact.mime_type()
        )
    })?;

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file {}", path.display()))?;

    for pair in artifact.data().chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
            .context("Failed to write sample")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    info!(
        "Wrote {} ({}Hz, {} channels, {}s)",
        path.display(),
        sample_rate,
        channels,
        artifact.duration_seconds()
    );

    Ok(())
}
