//! Callback contract towards the host UI

use std::sync::Mutex;

use crate::analysis::AudioLevelSample;
use crate::error::ErrorKind;
use crate::recording::RecordingArtifact;

/// Host UI callbacks
///
/// All methods default to doing nothing. Implementations must not block:
/// `on_level_update` is called from the level sampling task.
pub trait CaptureObserver: Send + Sync {
    /// A recording was finalized (`Some`) or the current one was cleared (`None`)
    fn on_recording_complete(&self, _artifact: Option<RecordingArtifact>) {}

    fn on_level_update(&self, _sample: AudioLevelSample) {}

    fn on_error(&self, _kind: ErrorKind, _message: String) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CaptureObserver for NoopObserver {}

/// Something an observer was told
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    RecordingComplete(Option<RecordingArtifact>),
    Level(AudioLevelSample),
    Error(ErrorKind, String),
}

/// Observer that keeps every notification, in order
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every artifact delivered through `on_recording_complete(Some(..))`
    pub fn artifacts(&self) -> Vec<RecordingArtifact> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObservedEvent::RecordingComplete(Some(artifact)) => Some(artifact),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObservedEvent::Error(kind, message) => Some((kind, message)),
                _ => None,
            })
            .collect()
    }

    pub fn level_updates(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ObservedEvent::Level(_)))
            .count()
    }
}

impl CaptureObserver for CollectingObserver {
    fn on_recording_complete(&self, artifact: Option<RecordingArtifact>) {
        self.push(ObservedEvent::RecordingComplete(artifact));
    }

    fn on_level_update(&self, sample: AudioLevelSample) {
        self.push(ObservedEvent::Level(sample));
    }

    fn on_error(&self, kind: ErrorKind, message: String) {
        self.push(ObservedEvent::Error(kind, message));
    }
}
