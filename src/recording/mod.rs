pub mod artifact;
pub mod chunk;
pub mod recorder;
pub mod state;

pub use artifact::{negotiate_mime_type, RecordingArtifact, FALLBACK_MIME_TYPE};
pub use chunk::ChunkBuffer;
pub use recorder::AudioRecorder;
pub use state::RecorderState;
