use std::borrow::Cow;
use std::path::Path;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::AppError;
use crate::stt::{Segment, SttModel, Transcription, STT_SAMPLE_RATE};

/// Longest audio one upload may expand to when resampled (an hour at 16 kHz).
const MAX_DECODED_SAMPLES: u64 = 60 * 60 * STT_SAMPLE_RATE as u64;

pub struct WhisperStt {
    context: WhisperContext,
    language: String,
}

impl WhisperStt {
    pub fn load(model_path: &Path, language: &str) -> Result<Self, AppError> {
        let path = model_path.to_str().ok_or_else(|| {
            AppError::TranscriptionError(format!("Invalid model path: {}", model_path.display()))
        })?;

        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| {
                AppError::TranscriptionError(format!("Failed to load Whisper model: {}", e))
            })?;

        Ok(Self {
            context,
            language: language.to_string(),
        })
    }
}

impl SttModel for WhisperStt {
    fn transcribe(&self, path: &Path, beam_size: usize) -> Result<Transcription, AppError> {
        let samples = read_wav_mono_16k(path)?;

        // Each request decodes on its own state; the context is shared
        let mut state = self.context.create_state().map_err(|e| {
            AppError::TranscriptionError(format!("Failed to create decode state: {}", e))
        })?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: beam_size as i32,
            patience: -1.0,
        });
        params.set_language(Some(&self.language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &samples)
            .map_err(|e| AppError::TranscriptionError(format!("Decode failed: {}", e)))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| AppError::TranscriptionError(format!("Failed to read segments: {}", e)))?;

        let mut segments = Vec::with_capacity(n_segments as usize);
        let mut prob_sum = 0.0f64;
        let mut token_count = 0usize;

        for i in 0..n_segments {
            let text = state.full_get_segment_text(i).map_err(|e| {
                AppError::TranscriptionError(format!("Failed to read segment text: {}", e))
            })?;

            let n_tokens = state.full_n_tokens(i).map_err(|e| {
                AppError::TranscriptionError(format!("Failed to read segment tokens: {}", e))
            })?;
            for t in 0..n_tokens {
                let prob = state.full_get_token_prob(i, t).map_err(|e| {
                    AppError::TranscriptionError(format!("Failed to read token prob: {}", e))
                })?;
                prob_sum += prob as f64;
                token_count += 1;
            }

            segments.push(Segment { text });
        }

        // English-only models always decode the configured language; report
        // mean token probability as the confidence
        let language_probability = if token_count > 0 {
            (prob_sum / token_count as f64).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };

        Ok(Transcription {
            segments,
            language: self.language.clone(),
            language_probability,
        })
    }
}

/// Read a WAV file as mono f32 samples at 16 kHz
pub fn read_wav_mono_16k(path: &Path) -> Result<Vec<f32>, AppError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AppError::TranscriptionError(format!("Failed to read WAV: {}", e)))?;
    let spec = reader.spec();

    // hound accepts a header declaring rate 0; it must not reach the resampler
    if spec.sample_rate == 0 {
        return Err(AppError::TranscriptionError(
            "Invalid WAV: zero sample rate".to_string(),
        ));
    }

    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| AppError::TranscriptionError(format!("Corrupt WAV data: {}", e)))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::TranscriptionError(format!("Corrupt WAV data: {}", e)))?,
    };

    let mut mono = Vec::with_capacity(samples.len() / channels);
    for frame in samples.chunks(channels) {
        mono.push(frame.iter().sum::<f32>() / channels as f32);
    }

    // A tiny declared rate would multiply the sample count at resample time
    let resampled_len = mono.len() as u64 * STT_SAMPLE_RATE as u64 / spec.sample_rate as u64;
    if resampled_len > MAX_DECODED_SAMPLES {
        return Err(AppError::TranscriptionError(format!(
            "Audio too long: {} samples at 16 kHz",
            resampled_len
        )));
    }

    Ok(resample_linear(&mono, spec.sample_rate, STT_SAMPLE_RATE).into_owned())
}

/// Resample with linear interpolation
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Cow<'_, [f32]> {
    if from_rate == to_rate {
        return Cow::Borrowed(samples);
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = (samples.len() as f64 * ratio) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 / ratio;
        let idx = src.floor() as usize;
        let frac = src.fract() as f32;
        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        out.push(sample);
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i16]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    // Hand-built 16-bit mono PCM file with an arbitrary declared sample rate
    fn crafted_wav(sample_rate: u32, sample_count: usize) -> Vec<u8> {
        let data_len = (sample_count * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.wrapping_mul(2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + sample_count * 2, 0);
        bytes
    }

    #[test]
    fn test_read_wav_mono_16k_passthrough() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let tmp = tempfile::NamedTempFile::new().unwrap();
        write_wav(tmp.path(), spec, &[0, 16384, -16384, 0]);

        let samples = read_wav_mono_16k(tmp.path()).unwrap();
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 0.01);
        assert!((samples[2] + 0.5).abs() < 0.01);
    }

    #[test]
    fn test_read_wav_averages_channels() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let tmp = tempfile::NamedTempFile::new().unwrap();
        // One frame: left 0.5, right -0.5 -> mono 0.0
        write_wav(tmp.path(), spec, &[16384, -16384]);

        let samples = read_wav_mono_16k(tmp.path()).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].abs() < 0.01);
    }

    #[test]
    fn test_read_wav_resamples_to_16k() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let tmp = tempfile::NamedTempFile::new().unwrap();
        write_wav(tmp.path(), spec, &[0; 800]);

        let samples = read_wav_mono_16k(tmp.path()).unwrap();
        assert_eq!(samples.len(), 1600);
    }

    #[test]
    fn test_read_wav_rejects_garbage() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"not a wav file").unwrap();

        assert!(read_wav_mono_16k(tmp.path()).is_err());
    }

    #[test]
    fn test_read_wav_rejects_zero_sample_rate() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), crafted_wav(0, 1)).unwrap();

        let err = read_wav_mono_16k(tmp.path()).unwrap_err();
        assert!(matches!(err, AppError::TranscriptionError(_)));
    }

    #[test]
    fn test_read_wav_rejects_absurd_resample_expansion() {
        // A 1 Hz declared rate would expand every sample 16000x
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), crafted_wav(1, 3601)).unwrap();

        let err = read_wav_mono_16k(tmp.path()).unwrap_err();
        assert!(matches!(err, AppError::TranscriptionError(_)));
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        let out = resample_linear(&samples, 16000, 16000);
        assert_eq!(out.as_ref(), samples.as_slice());
    }
}
