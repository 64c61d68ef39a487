use webrtc_vad::{SampleRate, Vad, VadMode};

use super::convert::TARGET_SAMPLE_RATE;

/// Frame length fed to the detector (30 ms at 16 kHz)
pub const FRAME_MS: u32 = 30;
/// Samples per detector frame
pub const FRAME_SAMPLES: usize = (TARGET_SAMPLE_RATE as usize * FRAME_MS as usize) / 1000;

/// Frames kept on each side of detected speech when filtering
const FILTER_PADDING_FRAMES: usize = 10;

/// WebRTC voice activity detector over 16 kHz mono frames
///
/// Not `Send`: the underlying detector holds a raw handle, so create one per
/// thread that needs it.
pub struct SpeechDetector {
    vad: Vad,
}

impl SpeechDetector {
    /// Creates a detector tuned to ignore background noise
    #[must_use]
    pub fn new() -> Self {
        Self {
            vad: Vad::new_with_rate_and_mode(SampleRate::Rate16kHz, VadMode::Aggressive),
        }
    }

    /// Whether a single frame contains speech
    ///
    /// Frames shorter than [`FRAME_SAMPLES`] are treated as silence.
    pub fn is_speech(&mut self, frame: &[f32]) -> bool {
        if frame.len() < FRAME_SAMPLES {
            return false;
        }

        #[allow(clippy::cast_possible_truncation)]
        let pcm: Vec<i16> = frame[..FRAME_SAMPLES]
            .iter()
            .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
            .collect();

        self.vad.is_voice_segment(&pcm).unwrap_or(false)
    }

    /// Drops non-speech stretches, keeping some padding around voiced frames
    ///
    /// Returns an empty buffer when no frame contains speech.
    pub fn filter_speech(&mut self, samples: &[f32]) -> Vec<f32> {
        let flags: Vec<bool> = samples
            .chunks(FRAME_SAMPLES)
            .map(|frame| self.is_speech(frame))
            .collect();
        let keep = keep_mask(&flags, FILTER_PADDING_FRAMES);

        let kept: Vec<f32> = samples
            .chunks(FRAME_SAMPLES)
            .zip(keep)
            .filter(|(_, keep)| *keep)
            .flat_map(|(frame, _)| frame.iter().copied())
            .collect();

        tracing::debug!(
            frames = flags.len(),
            voiced = flags.iter().filter(|f| **f).count(),
            kept_samples = kept.len(),
            "voice activity filter applied"
        );

        kept
    }
}

impl Default for SpeechDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks every frame within `padding` frames of a voiced frame
fn keep_mask(flags: &[bool], padding: usize) -> Vec<bool> {
    let mut keep = vec![false; flags.len()];
    for (i, _) in flags.iter().enumerate().filter(|(_, voiced)| **voiced) {
        let start = i.saturating_sub(padding);
        let end = (i + padding + 1).min(flags.len());
        for slot in &mut keep[start..end] {
            *slot = true;
        }
    }
    keep
}

/// Progress of an utterance as frames arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// No speech heard yet
    Waiting,
    /// Speech in progress
    Speaking,
    /// Speech ended (trailing silence or length cap reached)
    Complete,
}

/// Frame-by-frame end-of-speech detection
///
/// Waits indefinitely for speech to begin, then completes after enough trailing
/// silence or once the utterance reaches its length cap.
#[derive(Debug)]
pub struct Endpointer {
    silence_frames: usize,
    max_frames: usize,
    heard_speech: bool,
    trailing_silence: usize,
    utterance_frames: usize,
}

impl Endpointer {
    /// Creates an endpointer for the given trailing silence and length cap
    #[must_use]
    pub fn new(silence_ms: u32, max_utterance_secs: u32) -> Self {
        let frames_for = |ms: u32| (ms / FRAME_MS).max(1) as usize;
        Self {
            silence_frames: frames_for(silence_ms),
            max_frames: frames_for(max_utterance_secs.saturating_mul(1000)),
            heard_speech: false,
            trailing_silence: 0,
            utterance_frames: 0,
        }
    }

    /// Feeds one frame's speech flag
    pub fn push(&mut self, is_speech: bool) -> Endpoint {
        if !self.heard_speech {
            if !is_speech {
                return Endpoint::Waiting;
            }
            self.heard_speech = true;
        }

        self.utterance_frames += 1;
        if is_speech {
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += 1;
        }

        if self.trailing_silence >= self.silence_frames || self.utterance_frames >= self.max_frames {
            Endpoint::Complete
        } else {
            Endpoint::Speaking
        }
    }
}
