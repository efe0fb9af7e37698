// File-backed media platform
//
// Exposes a decoded audio file as a single virtual microphone that "plays"
// in real time from the moment its stream is granted. The encoder emits raw
// little-endian 16-bit PCM per timeslice; the analyser runs a DFT over the
// samples at the current playback position. There are no cameras.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{
    AcquireError, CapturedFrame, DeviceInfo, DeviceKind, FrequencyAnalyser, MediaEncoder,
    MediaPlatform, MediaStream, MediaTrack, StreamRequest, TrackState,
};
use crate::audio::AudioFile;
use crate::capture::CaptureKind;

/// Decibel range mapped onto the 0..=255 byte scale
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

const DEVICE_ID: &str = "file-mic";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Real-time playback position of one stream
#[derive(Clone)]
struct PlaybackClock {
    audio: Arc<AudioFile>,
    started: Instant,
}

impl PlaybackClock {
    /// Frames played so far, capped at the end of the file
    fn position(&self) -> usize {
        let played = self.started.elapsed().as_secs_f64() * self.audio.sample_rate as f64;
        (played as usize).min(self.audio.frames())
    }

    fn pcm_bytes(&self, from: usize, to: usize) -> Vec<u8> {
        let channels = self.audio.channels as usize;
        let start = (from * channels).min(self.audio.samples.len());
        let end = (to * channels).min(self.audio.samples.len());

        self.audio.samples[start..end]
            .iter()
            .flat_map(|sample| sample.to_le_bytes())
            .collect()
    }
}

struct FileTrack {
    id: String,
    label: String,
    ended: AtomicBool,
}

impl MediaTrack for FileTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> CaptureKind {
        CaptureKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn device_id(&self) -> Option<&str> {
        Some(DEVICE_ID)
    }

    fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn stop(&self) -> Result<()> {
        if !self.ended.swap(true, Ordering::SeqCst) {
            debug!("File track {} stopped", self.id);
        }
        Ok(())
    }
}

struct FileStream {
    id: String,
    track: Arc<FileTrack>,
    clock: PlaybackClock,
}

#[async_trait]
impl MediaStream for FileStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![Arc::clone(&self.track) as Arc<dyn MediaTrack>]
    }

    async fn ready(&self) {}
}

struct FileEncoder {
    mime_type: String,
    clock: PlaybackClock,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl MediaEncoder for FileEncoder {
    fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.stop_tx.is_some() {
            bail!("Encoder already started");
        }

        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);

        let clock = self.clock.clone();
        let mut emitted = clock.position();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeslice);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let stopping = tokio::select! {
                    _ = ticker.tick() => false,
                    _ = &mut stop_rx => true,
                };

                let position = clock.position();
                if position > emitted {
                    let chunk = clock.pcm_bytes(emitted, position);
                    emitted = position;
                    if chunk_tx.send(chunk).await.is_err() {
                        break;
                    }
                }

                if stopping {
                    break;
                }
            }

            debug!("File encoder finished at frame {}", emitted);
        });

        Ok(chunk_rx)
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        Ok(())
    }
}

struct FileAnalyser {
    fft_size: usize,
    clock: PlaybackClock,
    closed: AtomicBool,
}

impl FrequencyAnalyser for FileAnalyser {
    fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn frequency_data(&self) -> Option<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }

        let end = self.clock.position();
        let start = end.saturating_sub(self.fft_size);
        let window = self.clock.audio.mono_window(start, self.fft_size);
        Some(spectrum_bytes(&window))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Blackman-windowed DFT magnitudes mapped onto bytes over the decibel range
fn spectrum_bytes(samples: &[f32]) -> Vec<u8> {
    let n = samples.len();
    if n < 2 {
        return Vec::new();
    }

    let windowed: Vec<f32> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let x = 2.0 * PI * i as f32 / n as f32;
            let w = 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos();
            s * w
        })
        .collect();

    (0..n / 2)
        .map(|k| {
            let (mut re, mut im) = (0.0f32, 0.0f32);
            for (i, &s) in windowed.iter().enumerate() {
                let angle = -2.0 * PI * k as f32 * i as f32 / n as f32;
                re += s * angle.cos();
                im += s * angle.sin();
            }

            let magnitude = (re * re + im * im).sqrt() / n as f32;
            let db = if magnitude > 0.0 {
                20.0 * magnitude.log10()
            } else {
                MIN_DECIBELS
            };

            let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
            scaled.clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Platform whose only device is a microphone replaying an audio file
pub struct FilePlatform {
    audio: Arc<AudioFile>,
    label: String,
    streams: Mutex<Vec<Arc<FileStream>>>,
    next_id: AtomicUsize,
}

impl FilePlatform {
    pub fn new(audio: AudioFile) -> Self {
        let label = std::path::Path::new(&audio.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Audio file".to_string());

        Self {
            audio: Arc::new(audio),
            label,
            streams: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// MIME type of the raw PCM this platform produces
    pub fn pcm_mime_type(&self) -> String {
        format!(
            "audio/L16;rate={};channels={}",
            self.audio.sample_rate, self.audio.channels
        )
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.audio.duration_seconds)
    }

    fn find_stream(&self, id: &str) -> Result<Arc<FileStream>> {
        match lock(&self.streams).iter().find(|s| s.id == id) {
            Some(stream) => Ok(Arc::clone(stream)),
            None => bail!("Stream {} was not opened by the file platform", id),
        }
    }
}

#[async_trait]
impl MediaPlatform for FilePlatform {
    async fn request_media_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<Arc<dyn MediaStream>, AcquireError> {
        let StreamRequest::Audio { sample_rate, .. } = request else {
            return Err(AcquireError::NotFound);
        };

        if let Some(rate) = sample_rate {
            if *rate != self.audio.sample_rate {
                debug!(
                    "Requested {}Hz, file plays at {}Hz",
                    rate, self.audio.sample_rate
                );
            }
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stream = Arc::new(FileStream {
            id: format!("file-stream-{}", n),
            track: Arc::new(FileTrack {
                id: format!("{}-track-{}", DEVICE_ID, n),
                label: self.label.clone(),
                ended: AtomicBool::new(false),
            }),
            clock: PlaybackClock {
                audio: Arc::clone(&self.audio),
                started: Instant::now(),
            },
        });

        info!("Playing '{}' as microphone input", self.label);
        lock(&self.streams).push(Arc::clone(&stream));
        Ok(stream)
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            id: DEVICE_ID.to_string(),
            label: self.label.clone(),
            kind: DeviceKind::AudioInput,
        }])
    }

    fn is_encoding_supported(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case(&self.pcm_mime_type())
    }

    fn create_encoder(
        &self,
        stream: Arc<dyn MediaStream>,
        mime_type: Option<&str>,
    ) -> Result<Box<dyn MediaEncoder>> {
        if let Some(requested) = mime_type {
            if !self.is_encoding_supported(requested) {
                bail!("File platform cannot encode {}", requested);
            }
        }

        let stream = self.find_stream(stream.id())?;
        Ok(Box::new(FileEncoder {
            mime_type: self.pcm_mime_type(),
            clock: stream.clock.clone(),
            stop_tx: None,
        }))
    }

    fn create_analyser(
        &self,
        stream: Arc<dyn MediaStream>,
        fft_size: usize,
    ) -> Result<Arc<dyn FrequencyAnalyser>> {
        if fft_size < 2 {
            bail!("FFT size must be at least 2, got {}", fft_size);
        }

        let stream = self.find_stream(stream.id())?;
        Ok(Arc::new(FileAnalyser {
            fft_size,
            clock: stream.clock.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn grab_frame(&self, _stream: Arc<dyn MediaStream>) -> Result<CapturedFrame> {
        bail!("File platform has no camera")
    }

    fn active_streams(&self) -> Vec<Arc<dyn MediaStream>> {
        lock(&self.streams)
            .iter()
            .filter(|s| s.is_live())
            .map(|s| Arc::clone(s) as Arc<dyn MediaStream>)
            .collect()
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frequency: f32, amplitude: f32, sample_rate: u32, seconds: f32) -> AudioFile {
        let frames = (sample_rate as f32 * seconds) as usize;
        let samples = (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((2.0 * PI * frequency * t).sin() * amplitude) as i16
            })
            .collect();
        AudioFile::from_samples("tone.wav", sample_rate, 1, samples)
    }

    #[test]
    fn test_silence_maps_to_zero_bytes() {
        let bins = spectrum_bytes(&[0.0; 64]);
        assert_eq!(bins.len(), 32);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_in_its_bin() {
        // 1 kHz at 8 kHz with 64 points lands in bin 8; quiet enough to stay
        // under the -30 dB ceiling
        let audio = tone(1000.0, 300.0, 8000, 0.1);
        let bins = spectrum_bytes(&audio.mono_window(0, 64));

        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, b)| **b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 8);
        assert!(bins[8] > 100 && bins[8] < 255, "peak was {}", bins[8]);
        assert!(bins[7] < bins[8] && bins[9] < bins[8]);
        assert!(bins[20] < 50, "far bin was {}", bins[20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoder_emits_played_pcm_and_closes_on_stop() {
        let platform = FilePlatform::new(tone(440.0, 16000.0, 8000, 1.0));
        let request = StreamRequest::Audio {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: None,
        };
        let stream = platform.request_media_stream(&request).await.unwrap();

        let mut encoder = platform.create_encoder(stream, None).unwrap();
        assert_eq!(encoder.mime_type(), "audio/L16;rate=8000;channels=1");

        let mut rx = encoder.start(Duration::from_millis(100)).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        encoder.stop().unwrap();

        let mut total = 0;
        while let Some(chunk) = rx.recv().await {
            total += chunk.len();
        }

        // 250ms at 8kHz mono, 2 bytes per sample
        assert_eq!(total, 4000);
    }

    #[tokio::test]
    async fn test_no_camera() {
        let platform = FilePlatform::new(tone(440.0, 16000.0, 8000, 0.1));
        let request = StreamRequest::Video {
            ideal_width: 640,
            ideal_height: 480,
            max_width: 640,
            max_height: 480,
            source: super::super::VideoSource::Facing(crate::capture::FacingMode::User),
        };

        assert!(matches!(
            platform.request_media_stream(&request).await,
            Err(AcquireError::NotFound)
        ));
    }
}
