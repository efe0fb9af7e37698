use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::constraints::CaptureKind;
use crate::error::CaptureError;
use crate::platform::{MediaTrack, TrackState};

/// Polls a session's tracks and reports the first one that ends unexpectedly
///
/// The loss handler runs on its own task, so it is free to tear down the
/// session (and this watchdog) without cancelling itself. Dropping the
/// watchdog stops it.
pub struct TrackWatchdog {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TrackWatchdog {
    pub fn spawn<F, Fut>(
        kind: CaptureKind,
        tracks: Vec<Arc<dyn MediaTrack>>,
        interval: Duration,
        on_lost: F,
    ) -> Self
    where
        F: FnOnce(CaptureError) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

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

                // Our own teardown may have stopped the tracks
                if *shutdown_rx.borrow() {
                    break;
                }

                let lost = tracks
                    .iter()
                    .find(|track| track.ready_state() == TrackState::Ended);

                if let Some(track) = lost {
                    warn!("{} track '{}' ended unexpectedly", kind, track.label());
                    tokio::spawn(on_lost(CaptureError::CaptureLost {
                        kind,
                        track: track.label().to_string(),
                    }));
                    break;
                }
            }

            debug!("{} track watchdog stopped", kind);
        });

        Self { shutdown, handle }
    }

    pub fn stop(self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for TrackWatchdog {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}
