//! Live audio analysis
//!
//! Level sampling from frequency snapshots and the quality heuristic shown
//! to the user while recording.

mod level;
mod quality;

pub use level::{level_from_bins, sample_analyser, sample_level, AudioLevelSample, LevelMonitor};
pub use quality::{classify, Quality, QualityTracker};
