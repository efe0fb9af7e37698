use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{info, warn};

/// Fully decoded audio file, interleaved 16-bit samples
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Decode any container/codec symphonia understands
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Failed to open audio file {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("Failed to probe audio format")?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow!("No audio track found"))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("Audio track has no sample rate"))?;
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Failed to create decoder")?;

        let mut samples: Vec<i16> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(e) => return Err(e).context("Failed to read audio packet"),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(e).context("Failed to decode audio packet"),
            };

            let spec = *decoded.spec();
            if channels == 0 {
                channels = spec.channels.count() as u16;
            }

            let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        if channels == 0 {
            anyhow::bail!("Could not determine channel count for {}", path.display());
        }

        let audio = Self::from_samples(path.display().to_string(), sample_rate, channels, samples);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            audio.duration_seconds,
            audio.sample_rate,
            audio.channels,
            audio.samples.len()
        );

        Ok(audio)
    }

    /// Wrap already decoded interleaved samples
    pub fn from_samples(
        path: impl Into<String>,
        sample_rate: u32,
        channels: u16,
        samples: Vec<i16>,
    ) -> Self {
        let duration_seconds = if sample_rate == 0 || channels == 0 {
            0.0
        } else {
            samples.len() as f64 / (sample_rate as f64 * channels as f64)
        };

        Self {
            path: path.into(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Mono window of `len` frames starting at `start`, normalized to [-1, 1]
    ///
    /// Frames past the end of the file read as silence.
    pub fn mono_window(&self, start: usize, len: usize) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;

        (start..start + len)
            .map(|frame| {
                let offset = frame * channels;
                match self.samples.get(offset..offset + channels) {
                    Some(frame) => {
                        let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
                        sum / channels as f32
                    }
                    None => 0.0,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_sample_count() {
        let audio = AudioFile::from_samples("mem", 8000, 2, vec![0; 16000]);
        assert_eq!(audio.frames(), 8000);
        assert!((audio.duration_seconds - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mono_window_averages_channels_and_pads() {
        let audio = AudioFile::from_samples("mem", 8000, 2, vec![16384, 0, -16384, -16384]);
        let window = audio.mono_window(0, 3);

        assert_eq!(window.len(), 3);
        assert!((window[0] - 0.25).abs() < 1e-6);
        assert!((window[1] + 0.5).abs() < 1e-6);
        assert_eq!(window[2], 0.0);
    }
}
