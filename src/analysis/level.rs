use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::quality::{Quality, QualityTracker};
use crate::capture::CaptureSession;
use crate::config::QualitySettings;
use crate::platform::FrequencyAnalyser;

/// Normalized input amplitude in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct AudioLevelSample(f32);

impl AudioLevelSample {
    pub const SILENT: AudioLevelSample = AudioLevelSample(0.0);

    /// Clamp into `[0, 1]`; NaN becomes silence
    pub fn new(level: f32) -> Self {
        if level.is_nan() {
            return Self::SILENT;
        }
        Self(level.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

/// Average bin magnitude divided by the maximum byte magnitude
pub fn level_from_bins(bins: &[u8]) -> AudioLevelSample {
    if bins.is_empty() {
        return AudioLevelSample::SILENT;
    }

    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let average = sum as f32 / bins.len() as f32;
    AudioLevelSample::new(average / u8::MAX as f32)
}

/// Sample an analyser; a torn-down analyser reads as silence
pub fn sample_analyser(analyser: &dyn FrequencyAnalyser) -> AudioLevelSample {
    match analyser.frequency_data() {
        Some(bins) => level_from_bins(&bins),
        None => AudioLevelSample::SILENT,
    }
}

/// Current level of an open audio session
///
/// Returns silence instead of failing when the session has been closed or
/// its analyser is gone.
pub fn sample_level(session: &CaptureSession) -> AudioLevelSample {
    if !session.is_open() {
        return AudioLevelSample::SILENT;
    }

    match session.analyser() {
        Some(analyser) => sample_analyser(analyser.as_ref()),
        None => AudioLevelSample::SILENT,
    }
}

/// Periodic level sampling for one session
///
/// Keeps the latest sample and a quality window; each sample is also handed
/// to `on_sample`. Ends when stopped or once the analyser is torn down.
pub struct LevelMonitor {
    latest: Arc<AtomicU32>,
    tracker: Arc<Mutex<QualityTracker>>,
    started_at: Instant,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LevelMonitor {
    pub fn spawn<F>(
        analyser: Arc<dyn FrequencyAnalyser>,
        interval: Duration,
        settings: QualitySettings,
        on_sample: F,
    ) -> Self
    where
        F: Fn(AudioLevelSample) + Send + Sync + 'static,
    {
        let latest = Arc::new(AtomicU32::new(0f32.to_bits()));
        let tracker = Arc::new(Mutex::new(QualityTracker::new(settings)));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task_latest = Arc::clone(&latest);
        let task_tracker = Arc::clone(&tracker);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let Some(bins) = analyser.frequency_data() else {
                    task_latest.store(0f32.to_bits(), Ordering::SeqCst);
                    debug!("Analyser closed, level monitor exiting");
                    break;
                };

                let sample = level_from_bins(&bins);
                task_latest.store(sample.value().to_bits(), Ordering::SeqCst);
                task_tracker
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(sample.value());
                on_sample(sample);
            }
        });

        Self {
            latest,
            tracker,
            started_at: Instant::now(),
            shutdown,
            handle,
        }
    }

    pub fn latest(&self) -> AudioLevelSample {
        AudioLevelSample::new(f32::from_bits(self.latest.load(Ordering::SeqCst)))
    }

    /// Verdict for the samples seen so far
    pub fn quality(&self) -> Quality {
        self.tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .classify(self.started_at.elapsed())
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for LevelMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct FixedAnalyser {
        bins: Vec<u8>,
        closed: AtomicBool,
    }

    impl FrequencyAnalyser for FixedAnalyser {
        fn bin_count(&self) -> usize {
            self.bins.len()
        }

        fn frequency_data(&self) -> Option<Vec<u8>> {
            if self.closed.load(Ordering::SeqCst) {
                None
            } else {
                Some(self.bins.clone())
            }
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_level_is_average_over_max_magnitude() {
        assert_eq!(level_from_bins(&[255; 128]).value(), 1.0);
        assert_eq!(level_from_bins(&[0; 128]).value(), 0.0);

        let level = level_from_bins(&[0, 255]).value();
        assert!((level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_closed_analyser_reads_as_silence() {
        let analyser = FixedAnalyser {
            bins: vec![200; 16],
            closed: AtomicBool::new(false),
        };
        assert!(sample_analyser(&analyser).value() > 0.7);

        analyser.close();
        assert_eq!(sample_analyser(&analyser), AudioLevelSample::SILENT);
    }

    #[test]
    fn test_sample_is_clamped() {
        assert_eq!(AudioLevelSample::new(1.7).value(), 1.0);
        assert_eq!(AudioLevelSample::new(-0.2).value(), 0.0);
        assert_eq!(AudioLevelSample::new(f32::NAN), AudioLevelSample::SILENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_samples_until_analyser_closes() {
        let analyser = Arc::new(FixedAnalyser {
            bins: vec![51; 128],
            closed: AtomicBool::new(false),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let monitor = LevelMonitor::spawn(
            analyser.clone(),
            Duration::from_millis(100),
            QualitySettings::default(),
            move |sample| sink.lock().unwrap().push(sample.value()),
        );

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!((monitor.latest().value() - 0.2).abs() < 1e-6);
        assert!(seen.lock().unwrap().len() >= 4);

        analyser.close();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(monitor.latest(), AudioLevelSample::SILENT);
        assert!(!monitor.is_running());
    }
}
