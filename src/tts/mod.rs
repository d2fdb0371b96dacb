pub mod kokoro;

use crate::error::AppError;

pub use kokoro::KokoroEngine;

/// One synthesized chunk: the source text, its IPA phonemes, and the audio
/// rendered for them.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub graphemes: String,
    pub phonemes: String,
    pub samples: Vec<f32>,
}

/// A loaded text-to-speech engine.
pub trait TtsPipeline: Send + Sync {
    /// Render `text` as an ordered sequence of audio chunks.
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<Vec<AudioSegment>, AppError>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}
