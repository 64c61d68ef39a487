/// Model download and management
pub mod download;
/// Whisper model inference engine
pub mod engine;
/// Utterance → transcript pipeline
pub mod transcriber;

pub use download::ensure_model_downloaded;
pub use engine::{SpeechToText, TranscriptionEngine, TranscriptionError};
pub use transcriber::{Transcriber, Transcript};
