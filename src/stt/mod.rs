pub mod whisper;

use std::path::Path;

use crate::error::AppError;

pub use whisper::WhisperStt;

/// Sample rate Whisper decodes at.
pub const STT_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Transcription {
    pub segments: Vec<Segment>,
    pub language: String,
    pub language_probability: f32,
}

/// A loaded speech-to-text model.
pub trait SttModel: Send + Sync {
    /// Transcribe the audio file at `path` with the given beam-search width.
    fn transcribe(&self, path: &Path, beam_size: usize) -> Result<Transcription, AppError>;
}
