use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, RwLock};

use byteorder::{ByteOrder, LittleEndian};
use lazy_static::lazy_static;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use regex::Regex;
use serde::Deserialize;

use crate::error::AppError;
use crate::tts::{AudioSegment, TtsPipeline};

/// Longest token sequence the model accepts between its two pad tokens.
const MAX_PHONEMES: usize = 510;

/// Width of one voice style vector.
const STYLE_DIM: usize = 256;

lazy_static! {
    static ref SENTENCES: Regex = Regex::new(r"[^.!?\n]+[.!?]*").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
pub struct KokoroConfig {
    pub vocab: HashMap<String, i64>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_espeak_voice")]
    pub espeak_voice: String,
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_espeak_voice() -> String {
    "en-us".to_string()
}

/// Per-voice style vectors, one 256-wide row per phoneme count.
struct StyleTable {
    rows: Vec<Vec<f32>>,
}

impl StyleTable {
    fn from_bytes(bytes: &[u8]) -> Result<Self, AppError> {
        let row_bytes = STYLE_DIM * 4;
        if bytes.is_empty() || bytes.len() % row_bytes != 0 {
            return Err(AppError::SynthesisError(format!(
                "Style table has invalid size: {} bytes",
                bytes.len()
            )));
        }

        let mut floats = vec![0.0f32; bytes.len() / 4];
        LittleEndian::read_f32_into(bytes, &mut floats);

        let rows = floats.chunks_exact(STYLE_DIM).map(|c| c.to_vec()).collect();

        Ok(Self { rows })
    }

    fn row(&self, token_count: usize) -> &[f32] {
        let idx = token_count.min(self.rows.len() - 1);
        &self.rows[idx]
    }
}

pub struct KokoroEngine {
    session: Mutex<Session>,
    vocab: HashMap<String, i64>,
    sample_rate: u32,
    espeak_voice: String,
    voices_dir: PathBuf,
    styles: RwLock<HashMap<String, Arc<StyleTable>>>,
}

impl KokoroEngine {
    pub fn load(models_dir: &Path) -> Result<Self, AppError> {
        let config_path = models_dir.join("config.json");
        let config: KokoroConfig = serde_json::from_reader(File::open(&config_path)?)?;

        let model_path = models_dir.join("kokoro-v1.0.onnx");
        let session = Session::builder()
            .map_err(|e| {
                AppError::SynthesisError(format!("Failed to create session builder: {}", e))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                AppError::SynthesisError(format!("Failed to set optimization level: {}", e))
            })?
            .with_intra_threads(4)
            .map_err(|e| AppError::SynthesisError(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| AppError::SynthesisError(format!("Failed to load model: {}", e)))?;

        Ok(Self {
            session: Mutex::new(session),
            vocab: config.vocab,
            sample_rate: config.sample_rate,
            espeak_voice: config.espeak_voice,
            voices_dir: models_dir.join("voices"),
            styles: RwLock::new(HashMap::new()),
        })
    }

    fn style_table(&self, voice: &str) -> Result<Arc<StyleTable>, AppError> {
        // Check cache
        {
            let styles = self.styles.read().unwrap();
            if let Some(table) = styles.get(voice) {
                return Ok(Arc::clone(table));
            }
        }

        // Load from disk
        let path = self.voices_dir.join(format!("{}.bin", voice));
        let bytes = fs::read(&path).map_err(|_| {
            AppError::SynthesisError(format!("No style data for voice '{}'", voice))
        })?;
        let table = Arc::new(StyleTable::from_bytes(&bytes)?);

        // Cache it
        {
            let mut styles = self.styles.write().unwrap();
            styles.insert(voice.to_string(), Arc::clone(&table));
        }

        Ok(table)
    }

    fn infer(&self, ids: &[i64], style_row: &[f32], speed: f32) -> Result<Vec<f32>, AppError> {
        // input_ids: [batch, sequence] = [1, token_count]
        let ids_value = Value::from_array((vec![1, ids.len()], ids.to_vec())).map_err(|e| {
            AppError::SynthesisError(format!("Failed to create input tensor: {}", e))
        })?;

        // style: [batch, dim] = [1, 256]
        let style_value =
            Value::from_array((vec![1, STYLE_DIM], style_row.to_vec())).map_err(|e| {
                AppError::SynthesisError(format!("Failed to create style tensor: {}", e))
            })?;

        // speed: [1]
        let speed_value = Value::from_array((vec![1], vec![speed])).map_err(|e| {
            AppError::SynthesisError(format!("Failed to create speed tensor: {}", e))
        })?;

        // Run inference
        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_value,
                "style" => style_value,
                "speed" => speed_value
            ])
            .map_err(|e| AppError::SynthesisError(format!("Inference failed: {}", e)))?;

        // Extract audio samples from output
        let output = outputs
            .get("waveform")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::SynthesisError("Missing output tensor".to_string()))?;

        let output_view = output.try_extract_tensor::<f32>().map_err(|e| {
            AppError::SynthesisError(format!("Failed to extract output tensor: {}", e))
        })?;

        let samples: Vec<f32> = output_view.1.iter().copied().collect();

        Ok(samples)
    }
}

impl TtsPipeline for KokoroEngine {
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<Vec<AudioSegment>, AppError> {
        let style = self.style_table(voice)?;

        let mut segments = Vec::new();
        for sentence in segment_text(text) {
            let phonemes = phonemize(&sentence, &self.espeak_voice)?;
            let ids = tokenize(&phonemes, &self.vocab);
            if ids.len() <= 2 {
                // Nothing the model can voice in this sentence
                continue;
            }

            let samples = self.infer(&ids, style.row(ids.len() - 2), speed)?;

            segments.push(AudioSegment {
                graphemes: sentence,
                phonemes,
                samples,
            });
        }

        Ok(segments)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Split text into sentence-sized chunks for the synthesis loop
pub fn segment_text(text: &str) -> Vec<String> {
    SENTENCES
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Convert text to IPA phonemes using espeak-ng
pub fn phonemize(text: &str, voice: &str) -> Result<String, AppError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let output = Command::new("espeak-ng")
        .args(["--ipa", "-q", "-v", voice, text])
        .output()
        .map_err(|e| {
            AppError::SynthesisError(format!("Failed to run espeak-ng (is it installed?): {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::SynthesisError(format!(
            "espeak-ng failed: {}",
            stderr
        )));
    }

    let phonemes = String::from_utf8_lossy(&output.stdout).trim().to_string();

    Ok(phonemes)
}

/// Map IPA phonemes to model token ids, wrapped in the pad token (id 0)
pub fn tokenize(phonemes: &str, vocab: &HashMap<String, i64>) -> Vec<i64> {
    let mut ids = Vec::with_capacity(phonemes.chars().count() + 2);
    ids.push(0);

    for ch in phonemes.chars() {
        // Characters outside the vocabulary are skipped
        if let Some(&id) = vocab.get(&ch.to_string()) {
            ids.push(id);
        }
    }

    if ids.len() > MAX_PHONEMES + 1 {
        tracing::warn!(
            "Phoneme sequence truncated from {} to {} tokens",
            ids.len() - 1,
            MAX_PHONEMES
        );
        ids.truncate(MAX_PHONEMES + 1);
    }

    ids.push(0);
    ids
}
