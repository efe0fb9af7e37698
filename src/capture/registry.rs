use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::platform::{MediaStream, TrackState};

/// Outcome of a sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Streams inspected
    pub streams_scanned: usize,
    /// Live tracks that were force-stopped
    pub tracks_stopped: usize,
    /// Tracks whose stop call failed (logged and skipped)
    pub failures: usize,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.streams_scanned += other.streams_scanned;
        self.tracks_stopped += other.tracks_stopped;
        self.failures += other.failures;
    }
}

/// Registry of every stream opened through an acquirer
///
/// Cloning shares the same underlying set. Used as the last-resort safety
/// net: `sweep` force-stops whatever is still live.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<Mutex<HashMap<String, Arc<dyn MediaStream>>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn MediaStream>>> {
        self.streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, stream: Arc<dyn MediaStream>) {
        let mut streams = self.lock();
        streams.insert(stream.id().to_string(), stream);
        debug!("Registered stream (tracked: {})", streams.len());
    }

    /// Returns true if the stream was tracked
    pub fn unregister(&self, stream_id: &str) -> bool {
        let mut streams = self.lock();
        let removed = streams.remove(stream_id).is_some();
        if removed {
            debug!("Unregistered stream {} (tracked: {})", stream_id, streams.len());
        }
        removed
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.lock().contains_key(stream_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Force-stop every live track of every registered stream and forget them all
    pub fn sweep(&self) -> SweepReport {
        let streams: Vec<_> = self.lock().drain().map(|(_, stream)| stream).collect();
        let report = sweep_streams(streams);

        if report.tracks_stopped > 0 || report.failures > 0 {
            warn!(
                "Registry sweep stopped {} live tracks across {} streams ({} failures)",
                report.tracks_stopped, report.streams_scanned, report.failures
            );
        } else {
            debug!("Registry sweep found no live tracks");
        }

        report
    }
}

/// Force-stop every live track in the given streams
///
/// Per-track failures are logged and the sweep keeps going.
pub fn sweep_streams(streams: impl IntoIterator<Item = Arc<dyn MediaStream>>) -> SweepReport {
    let mut report = SweepReport::default();

    for stream in streams {
        report.streams_scanned += 1;

        for track in stream.tracks() {
            if track.ready_state() != TrackState::Live {
                continue;
            }

            match track.stop() {
                Ok(()) => {
                    info!("Sweep stopped {} track '{}'", track.kind(), track.label());
                    report.tracks_stopped += 1;
                }
                Err(e) => {
                    warn!("Sweep failed to stop track '{}': {:#}", track.label(), e);
                    report.failures += 1;
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureKind;
    use crate::platform::simulated::SimulatedStream;
    use crate::platform::{MediaTrack, SimulatedTrack};

    fn stream_with_tracks(id: &str, tracks: Vec<Arc<SimulatedTrack>>) -> Arc<dyn MediaStream> {
        Arc::new(SimulatedStream::new(id, tracks))
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = StreamRegistry::new();
        let track = Arc::new(SimulatedTrack::new("t1", CaptureKind::Audio, "Mic"));
        registry.register(stream_with_tracks("s1", vec![track]));

        assert!(registry.contains("s1"));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("s1"));
        assert!(!registry.unregister("s1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_stops_live_tracks_and_clears() {
        let registry = StreamRegistry::new();
        let live = Arc::new(SimulatedTrack::new("t1", CaptureKind::Video, "Cam"));
        let ended = Arc::new(SimulatedTrack::new("t2", CaptureKind::Video, "Cam"));
        ended.stop().unwrap();

        registry.register(stream_with_tracks("s1", vec![live.clone(), ended.clone()]));

        let report = registry.sweep();
        assert_eq!(report.streams_scanned, 1);
        assert_eq!(report.tracks_stopped, 1);
        assert_eq!(live.ready_state(), TrackState::Ended);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_continues_past_failing_track() {
        let failing = Arc::new(SimulatedTrack::new("bad", CaptureKind::Video, "Cam A"));
        failing.fail_stop(true);
        let healthy = Arc::new(SimulatedTrack::new("good", CaptureKind::Video, "Cam B"));

        let report = sweep_streams(vec![stream_with_tracks(
            "s1",
            vec![failing.clone(), healthy.clone()],
        )]);

        assert_eq!(report.failures, 1);
        assert_eq!(report.tracks_stopped, 1);
        assert_eq!(healthy.ready_state(), TrackState::Ended);
        assert_eq!(failing.ready_state(), TrackState::Live);
    }
}
