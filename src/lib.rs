pub mod analysis;
pub mod audio;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod manager;
pub mod observer;
pub mod platform;
pub mod recording;

pub use analysis::{AudioLevelSample, Quality};
pub use audio::{write_pcm_wav, AudioFile};
pub use camera::CameraController;
pub use capture::{
    CameraCatalog, CaptureConstraints, CaptureKind, CaptureSession, SessionState, StreamRegistry,
    SweepReport,
};
pub use config::Config;
pub use error::{CaptureError, ErrorKind};
pub use manager::{CaptureManager, HostEvent};
pub use observer::{CaptureObserver, CollectingObserver, NoopObserver};
pub use platform::{FilePlatform, MediaPlatform, SimulatedPlatform};
pub use recording::{AudioRecorder, RecorderState, RecordingArtifact};
