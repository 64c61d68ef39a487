use std::sync::Arc;
use tracing::{debug, info, warn};

use super::engine::SpeechToText;
use crate::audio::convert::{decode_wav, to_16khz_mono};
use crate::audio::vad::SpeechDetector;

/// Text segments of one utterance, in chronological order
///
/// Consumed once; iterating it drains it.
#[derive(Debug, Default)]
pub struct Transcript {
    segments: std::vec::IntoIter<String>,
}

impl Transcript {
    /// A transcript with no segments
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Vec<String>> for Transcript {
    fn from(segments: Vec<String>) -> Self {
        Self {
            segments: segments.into_iter(),
        }
    }
}

impl Iterator for Transcript {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.segments.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.segments.size_hint()
    }
}

/// Turns captured audio into transcript segments
///
/// Never fails: unreadable or silent input, and inference errors, produce an
/// empty transcript so that nothing downstream matches.
pub struct Transcriber {
    engine: Arc<dyn SpeechToText>,
    vad_filter: bool,
}

impl Transcriber {
    /// Creates a transcriber with voice-activity filtering enabled
    pub fn new(engine: Arc<dyn SpeechToText>) -> Self {
        Self {
            engine,
            vad_filter: true,
        }
    }

    /// Enables or disables dropping non-speech audio before decoding
    #[must_use]
    pub const fn with_vad_filter(mut self, enabled: bool) -> Self {
        self.vad_filter = enabled;
        self
    }

    /// Transcribes a WAV-encoded utterance
    pub fn transcribe_wav(&self, wav: &[u8]) -> Transcript {
        match decode_wav(wav) {
            Ok(samples) => self.transcribe_16khz(&samples),
            Err(e) => {
                warn!("unreadable utterance: {e:#}");
                Transcript::empty()
            }
        }
    }

    /// Transcribes mono samples recorded at `sample_rate`
    pub fn transcribe(&self, audio: &[f32], sample_rate: u32) -> Transcript {
        let samples = to_16khz_mono(audio, sample_rate, 1);
        self.transcribe_16khz(&samples)
    }

    fn transcribe_16khz(&self, samples: &[f32]) -> Transcript {
        let _span = tracing::debug_span!("transcribe", samples = samples.len()).entered();

        let speech = if self.vad_filter {
            SpeechDetector::new().filter_speech(samples)
        } else {
            samples.to_vec()
        };

        if speech.is_empty() {
            debug!("no speech in utterance");
            return Transcript::empty();
        }

        match self.engine.transcribe(&speech) {
            Ok(segments) => {
                info!(segments = segments.len(), "utterance transcribed");
                Transcript::from(segments)
            }
            Err(e) => {
                warn!("transcription failed: {e}");
                Transcript::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::convert::encode_wav;
    use crate::transcription::engine::{MockSpeechToText, TranscriptionError};

    fn transcriber(mock: MockSpeechToText) -> Transcriber {
        Transcriber::new(Arc::new(mock)).with_vad_filter(false)
    }

    #[test]
    fn test_segments_returned_in_order() {
        let mut mock = MockSpeechToText::new();
        mock.expect_transcribe()
            .times(1)
            .returning(|_| Ok(vec!["Please add".to_owned(), "cumin.".to_owned()]));

        let segments: Vec<String> = transcriber(mock).transcribe(&[0.1; 1600], 16000).collect();
        assert_eq!(segments, vec!["Please add", "cumin."]);
    }

    #[test]
    fn test_empty_buffer_skips_engine() {
        let mut mock = MockSpeechToText::new();
        mock.expect_transcribe().times(0);

        assert_eq!(transcriber(mock).transcribe(&[], 16000).count(), 0);
    }

    #[test]
    fn test_unreadable_wav_is_empty_transcript() {
        let mut mock = MockSpeechToText::new();
        mock.expect_transcribe().times(0);

        assert_eq!(transcriber(mock).transcribe_wav(b"RIFF????").count(), 0);
    }

    #[test]
    fn test_engine_failure_is_empty_transcript() {
        let mut mock = MockSpeechToText::new();
        mock.expect_transcribe()
            .times(1)
            .returning(|_| Err(TranscriptionError::StateCreation));

        assert_eq!(transcriber(mock).transcribe(&[0.1; 1600], 16000).count(), 0);
    }

    #[test]
    fn test_wav_resampled_before_engine() {
        let mut mock = MockSpeechToText::new();
        mock.expect_transcribe()
            .withf(|audio: &[f32]| audio.len() == 1600)
            .times(1)
            .returning(|_| Ok(vec!["salt".to_owned()]));

        let wav = encode_wav(&[0.2; 1600]).unwrap();
        let segments: Vec<String> = transcriber(mock).transcribe_wav(&wav).collect();
        assert_eq!(segments, vec!["salt"]);
    }

    #[test]
    fn test_transcribe_resamples_to_16khz() {
        let mut mock = MockSpeechToText::new();
        mock.expect_transcribe()
            .withf(|audio: &[f32]| audio.len() == 1600)
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let _ = transcriber(mock).transcribe(&[0.2; 4800], 48000).count();
    }

    #[test]
    fn test_vad_filter_drops_silence_before_engine() {
        let mut mock = MockSpeechToText::new();
        mock.expect_transcribe().times(0);

        let transcriber = Transcriber::new(Arc::new(mock));
        assert_eq!(transcriber.transcribe(&[0.0; 16000], 16000).count(), 0);
    }

    #[test]
    fn test_transcript_is_single_pass() {
        let mut transcript = Transcript::from(vec!["one".to_owned()]);
        assert_eq!(transcript.next().as_deref(), Some("one"));
        assert_eq!(transcript.next(), None);
        assert_eq!(transcript.next(), None);
    }
}
