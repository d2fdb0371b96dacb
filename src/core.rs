use std::io::{Cursor, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::Serialize;

use crate::error::AppError;
use crate::stt::SttModel;
use crate::tts::TtsPipeline;

/// Beam-search width used for every transcription request.
pub const BEAM_SIZE: usize = 5;

/// Voice identifiers the synthesis model ships style data for.
pub const VOICES: [&str; 12] = [
    "af_bella",
    "af_sarah",
    "af_nicole",
    "af_sky",
    "am_adam",
    "am_michael",
    "am_eric",
    "am_fenrir",
    "bf_emma",
    "bf_isabella",
    "bm_george",
    "bm_lewis",
];

#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub text: String,
    pub language: String,
    pub probability: f32,
}

/// The static voice catalog.
pub fn voices() -> Vec<&'static str> {
    VOICES.to_vec()
}

/// Synthesize `text` into a complete WAV file.
pub fn synthesize(
    pipeline: &dyn TtsPipeline,
    text: &str,
    voice: &str,
    speed: f32,
    sample_rate: u32,
) -> Result<Vec<u8>, AppError> {
    // 1. Run the pipeline
    let segments = pipeline.synthesize(text, voice, speed)?;

    // 2. An empty chunk sequence means there was nothing to voice
    if segments.is_empty() {
        return Err(AppError::SynthesisError(
            "No audio generated (empty text?)".to_string(),
        ));
    }

    // 3. Concatenate chunks in order
    let mut samples = Vec::new();
    for segment in &segments {
        tracing::debug!(
            "Chunk '{}' -> '{}' ({} samples)",
            segment.graphemes,
            segment.phonemes,
            segment.samples.len()
        );
        samples.extend_from_slice(&segment.samples);
    }

    // 4. Encode WAV
    samples_to_wav(&samples, sample_rate)
}

/// Transcribe an uploaded audio file.
pub fn transcribe_upload(
    model: Option<&dyn SttModel>,
    content: &[u8],
    filename: Option<&str>,
) -> Result<Transcript, AppError> {
    // 1. No model, no service
    let model =
        model.ok_or_else(|| AppError::ModelNotLoaded("STT model not loaded".to_string()))?;

    // 2. Spill the upload to a uniquely named temp file; the guard removes it
    //    on every exit path, including engine failure
    let suffix = filename
        .and_then(|name| Path::new(name).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".wav".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix("yappr-upload-")
        .suffix(&suffix)
        .tempfile()?;
    tmp.write_all(content)?;

    // 3. Decode with the fixed beam width
    let result = model.transcribe(tmp.path(), BEAM_SIZE)?;

    // 4. Join segment texts with single spaces
    let text = result
        .segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(Transcript {
        text,
        language: result.language,
        probability: result.language_probability,
    })
}

/// Encode f32 samples as 16-bit mono PCM WAV
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AppError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let cursor = Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(cursor, spec).map_err(|e| {
            AppError::SynthesisError(format!("Failed to create WAV writer: {}", e))
        })?;

        for sample in samples {
            let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| AppError::SynthesisError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| AppError::SynthesisError(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(buffer)
}
