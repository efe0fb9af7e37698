pub mod file;
pub mod wav;

pub use file::AudioFile;
pub use wav::write_pcm_wav;
