use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::config::QualitySettings;

/// Recording quality verdict, used for live feedback only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quality {
    TooQuiet,
    TooLoud,
    TooShort,
    Good,
}

impl Quality {
    pub fn label(&self) -> &'static str {
        match self {
            Quality::TooQuiet => "Too Quiet",
            Quality::TooLoud => "Too Loud",
            Quality::TooShort => "Too Short",
            Quality::Good => "Good Quality",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a level history
///
/// Only the trailing `settings.window` samples count. Checks run in order:
/// persistently quiet, persistently loud, too short, otherwise good.
pub fn classify(samples: &[f32], elapsed: Duration, settings: &QualitySettings) -> Quality {
    let start = samples.len().saturating_sub(settings.window.max(1));
    let recent = &samples[start..];

    if recent.iter().all(|&level| level < settings.quiet_threshold) {
        Quality::TooQuiet
    } else if recent.iter().all(|&level| level > settings.loud_threshold) {
        Quality::TooLoud
    } else if elapsed.as_secs_f64() < settings.min_duration_secs {
        Quality::TooShort
    } else {
        Quality::Good
    }
}

/// Rolling window of recent levels
#[derive(Debug, Clone)]
pub struct QualityTracker {
    settings: QualitySettings,
    recent: VecDeque<f32>,
}

impl QualityTracker {
    pub fn new(settings: QualitySettings) -> Self {
        Self {
            recent: VecDeque::with_capacity(settings.window.max(1)),
            settings,
        }
    }

    pub fn push(&mut self, level: f32) {
        if self.recent.len() == self.settings.window.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(level);
    }

    pub fn classify(&self, elapsed: Duration) -> Quality {
        let recent: Vec<f32> = self.recent.iter().copied().collect();
        classify(&recent, elapsed, &self.settings)
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}
