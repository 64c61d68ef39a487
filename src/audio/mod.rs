/// Microphone capture with end-of-speech detection
pub mod capture;
/// Sample format conversion and WAV encoding
pub mod convert;
/// Voice activity detection
pub mod vad;

pub use capture::{CaptureSettings, MicrophoneSource};

use anyhow::Result;

/// Source of spoken utterances
///
/// Implementations block the calling thread until one complete utterance has
/// been captured.
#[cfg_attr(test, mockall::automock)]
pub trait UtteranceSource: Send + Sync {
    /// Captures one utterance as WAV bytes (16 kHz, mono, 32-bit float)
    ///
    /// # Errors
    /// Returns error if the input device is unavailable or the stream fails
    fn capture_utterance(&self) -> Result<Vec<u8>>;
}
