use anyhow::Context;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::{Config, VoiceConfig};

/// Whisper's marker for a segment with no speech
const BLANK_AUDIO: &str = "[BLANK_AUDIO]";

/// Speech-to-text over 16kHz mono f32 samples
///
/// Production code uses [`TranscriptionEngine`]; tests substitute
/// `MockSpeechToText` (via `mockall`).
#[cfg_attr(test, mockall::automock)]
pub trait SpeechToText: Send + Sync {
    /// Decodes audio into text segments in chronological order
    ///
    /// # Errors
    /// Returns error if inference fails
    fn transcribe(&self, audio_data: &[f32]) -> Result<Vec<String>, TranscriptionError>;
}

/// Errors that can occur during transcription
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Failed to load Whisper model
    #[error("failed to load whisper model from {path}: {source}")]
    ModelLoad {
        /// Path to model file
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Failed to create Whisper inference state
    #[error("failed to create whisper state")]
    StateCreation,

    /// Transcription inference failed
    #[error("failed to transcribe audio")]
    Transcription(#[from] anyhow::Error),
}

/// Whisper transcription engine
///
/// Decodes English only with a fixed beam width; pair it with a quantized
/// `tiny.en` model for low-latency CPU inference.
pub struct TranscriptionEngine {
    /// Whisper context (thread-safe)
    ctx: Arc<Mutex<WhisperContext>>,
    /// Number of CPU threads for inference
    threads: i32,
    /// Beam search width
    beam_size: i32,
}

impl TranscriptionEngine {
    /// Determines sampling strategy based on beam size (pure, testable)
    const fn get_sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }

    /// Loads the configured model, downloading it first if missing
    ///
    /// # Errors
    /// Returns error if the model cannot be downloaded or loaded
    pub fn from_config(config: &VoiceConfig) -> Result<Self, TranscriptionError> {
        let model_path = Config::expand_path(&config.model_path).map_err(|source| {
            TranscriptionError::ModelLoad {
                path: config.model_path.clone(),
                source,
            }
        })?;
        super::ensure_model_downloaded(&config.model, &model_path).map_err(|source| {
            TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source,
            }
        })?;
        Self::new(&model_path, config.threads, config.beam_size)
    }

    /// Creates a new `TranscriptionEngine` by loading the model from the given path
    ///
    /// # Errors
    /// Returns error if model file doesn't exist, is invalid, or if `threads`/`beam_size` are 0 or exceed `i32::MAX`
    pub fn new(
        model_path: &Path,
        threads: usize,
        beam_size: usize,
    ) -> Result<Self, TranscriptionError> {
        let invalid = |reason: String| TranscriptionError::ModelLoad {
            path: model_path.display().to_string(),
            source: anyhow::anyhow!(reason),
        };

        if threads == 0 {
            return Err(invalid("threads must be > 0".to_owned()));
        }
        if beam_size == 0 {
            return Err(invalid("beam_size must be > 0".to_owned()));
        }

        // whisper-rs takes i32 for both
        let threads_i32 = i32::try_from(threads)
            .map_err(|_| invalid(format!("threads value too large (max: {})", i32::MAX)))?;
        let beam_size_i32 = i32::try_from(beam_size)
            .map_err(|_| invalid(format!("beam_size value too large (max: {})", i32::MAX)))?;

        tracing::info!(
            path = %model_path.display(),
            threads,
            beam_size,
            "loading whisper model"
        );

        let path_str = model_path
            .to_str()
            .ok_or_else(|| invalid("model path contains invalid UTF-8".to_owned()))?;

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| invalid(format!("{e:?}")))?;

        tracing::info!("whisper model loaded successfully");

        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
            threads: threads_i32,
            beam_size: beam_size_i32,
        })
    }

    fn transcribe_impl(&self, audio_data: &[f32]) -> Result<Vec<String>, TranscriptionError> {
        let _span = tracing::debug_span!("transcription", samples = audio_data.len()).entered();

        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("mutex poisoned: {e}"))?
            .create_state()
            .map_err(|_| TranscriptionError::StateCreation)?;

        let strategy = Self::get_sampling_strategy(self.beam_size);
        let mut params = FullParams::new(strategy);
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(Some("en"));
        params.set_translate(false);
        params.set_single_segment(false);

        let start = std::time::Instant::now();
        state
            .full(params, audio_data)
            .context("whisper inference failed")?;
        let inference_duration = start.elapsed();

        let segments: Vec<String> = state
            .as_iter()
            .map(|segment| segment.to_string().trim().to_owned())
            .filter(|text| !text.is_empty() && text != BLANK_AUDIO)
            .collect();

        tracing::info!(
            segments = segments.len(),
            inference_ms = inference_duration.as_millis(),
            "transcription completed"
        );

        Ok(segments)
    }
}

impl SpeechToText for TranscriptionEngine {
    fn transcribe(&self, audio_data: &[f32]) -> Result<Vec<String>, TranscriptionError> {
        self.transcribe_impl(audio_data)
    }
}

// SAFETY: TranscriptionEngine is thread-safe because:
// 1. WhisperContext is wrapped in Arc<Mutex<>>, ensuring exclusive access
// 2. All methods require acquiring the mutex lock before accessing the context
// 3. Each transcription owns its WhisperState; no state is shared between calls
#[allow(unsafe_code)]
unsafe impl Send for TranscriptionEngine {}
#[allow(unsafe_code)]
unsafe impl Sync for TranscriptionEngine {}
