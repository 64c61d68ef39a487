use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapRb,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::convert::{encode_wav, save_wav, StreamResampler};
use super::vad::{Endpoint, Endpointer, SpeechDetector, FRAME_SAMPLES};
use super::UtteranceSource;
use crate::config::{Config, VoiceConfig};

/// Seconds of device audio the ring buffer holds between drains
const RING_BUFFER_SECS: usize = 2;
/// Interval between ring buffer drains while listening
const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Trait for controlling audio stream lifecycle
trait StreamControl {
    /// Resume audio stream (activate microphone)
    fn play(&self) -> Result<()>;
    /// Pause audio stream (deactivate microphone)
    fn pause(&self) -> Result<()>;
}

/// CPAL stream wrapper implementing `StreamControl`
struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<()> {
        self.stream.play().context("failed to resume audio stream")
    }

    fn pause(&self) -> Result<()> {
        self.stream.pause().context("failed to pause audio stream")
    }
}

/// Audio capture from the default input device
///
/// Lives on the thread that created it; the cpal stream is not `Send` on every
/// platform.
pub struct AudioCapture {
    /// Stream controller (kept alive to prevent stream drop)
    stream_control: Option<Box<dyn StreamControl>>,
    /// Ring buffer consumer for reading captured samples
    ring_buffer_consumer: HeapCons<f32>,
    /// Recording state flag
    is_recording: Arc<AtomicBool>,
    /// Device sample rate in Hz
    device_sample_rate: u32,
    /// Number of audio channels
    device_channels: u16,
    /// Carries the interpolation position from one drain to the next
    resampler: StreamResampler,
}

impl AudioCapture {
    /// Opens the default input device, paused
    ///
    /// # Errors
    /// Returns error if default audio device is unavailable or stream creation fails
    pub fn new() -> Result<Self> {
        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no input device available")?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        // Use the device default config; samples are resampled to 16kHz on drain
        let supported_config = device
            .default_input_config()
            .context("failed to get default input config")?;

        let device_sample_rate = supported_config.sample_rate().0;
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        let ring_buffer_capacity =
            (device_sample_rate as usize) * usize::from(device_channels) * RING_BUFFER_SECS;
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (mut producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));
        let is_recording_clone = Arc::clone(&is_recording);

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_recording_clone.load(Ordering::Relaxed) {
                        // Lock-free push to ring buffer
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .context("failed to build input stream")?;

        let stream_control = CpalStreamControl { stream };

        // Start the stream and immediately pause it (mic inactive until listening)
        stream_control.play()?;
        stream_control.pause()?;
        debug!("audio stream initialized (paused)");

        Ok(Self {
            stream_control: Some(Box::new(stream_control)),
            ring_buffer_consumer,
            is_recording,
            device_sample_rate,
            device_channels,
            resampler: StreamResampler::new(device_sample_rate, device_channels),
        })
    }

    /// Starts recording audio
    ///
    /// # Errors
    /// Returns error if the stream cannot be resumed
    pub fn start_recording(&mut self) -> Result<()> {
        self.ring_buffer_consumer.clear();
        self.resampler.reset();

        // Set recording flag BEFORE resuming stream to avoid race condition
        self.is_recording.store(true, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            stream_control.play()?;
        }

        info!("recording started");
        Ok(())
    }

    /// Drains whole frames captured so far, as 16kHz mono
    pub fn drain_16khz_mono(&mut self) -> Vec<f32> {
        let channels = usize::from(self.device_channels.max(1));
        let available = self.ring_buffer_consumer.occupied_len();
        let whole_frames = available - available % channels;

        let mut samples = vec![0.0; whole_frames];
        let popped = self.ring_buffer_consumer.pop_slice(&mut samples);
        samples.truncate(popped);

        self.resampler.push(&samples)
    }

    /// Stops recording
    ///
    /// # Errors
    /// Returns error if the stream cannot be paused
    pub fn stop_recording(&mut self) -> Result<()> {
        self.is_recording.store(false, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            stream_control.pause()?;
        }

        info!("recording stopped");
        Ok(())
    }
}

/// End-of-speech tuning for microphone capture
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Trailing silence that ends an utterance
    pub silence_ms: u32,
    /// Audio kept from before speech onset
    pub preroll_ms: u32,
    /// Hard cap on utterance length once speech has started
    pub max_utterance_secs: u32,
    /// Directory for per-utterance WAV dumps, if enabled
    pub debug_dir: Option<PathBuf>,
}

impl CaptureSettings {
    /// Builds settings from the voice config
    ///
    /// # Errors
    /// Returns error if the debug directory cannot be resolved
    pub fn from_config(config: &VoiceConfig) -> Result<Self> {
        let debug_dir = if config.save_debug_wav {
            Some(Config::expand_path("~/.spice-rack/debug")?)
        } else {
            None
        };

        Ok(Self {
            silence_ms: config.vad_silence_ms,
            preroll_ms: config.vad_preroll_ms,
            max_utterance_secs: config.max_utterance_secs,
            debug_dir,
        })
    }
}

/// Collects frames into one utterance, keeping a bounded pre-roll before onset
struct UtteranceBuffer {
    endpointer: Endpointer,
    preroll_frames: usize,
    frames: Vec<Vec<f32>>,
    pending: Vec<f32>,
}

impl UtteranceBuffer {
    fn new(settings: &CaptureSettings) -> Self {
        Self {
            endpointer: Endpointer::new(settings.silence_ms, settings.max_utterance_secs),
            preroll_frames: (settings.preroll_ms / super::vad::FRAME_MS) as usize,
            frames: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Appends samples; returns true once the utterance is complete
    fn extend(&mut self, samples: &[f32], is_speech: &mut impl FnMut(&[f32]) -> bool) -> bool {
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
            let endpoint = self.endpointer.push(is_speech(&frame));
            self.frames.push(frame);

            match endpoint {
                Endpoint::Waiting => {
                    let excess = self.frames.len().saturating_sub(self.preroll_frames);
                    self.frames.drain(..excess);
                }
                Endpoint::Speaking => {}
                Endpoint::Complete => return true,
            }
        }

        false
    }

    fn into_samples(self) -> Vec<f32> {
        self.frames.concat()
    }
}

/// Captures utterances from the default microphone
///
/// Each call opens the device on the calling thread, waits (without timeout)
/// for speech, and stops after trailing silence.
pub struct MicrophoneSource {
    settings: CaptureSettings,
}

impl MicrophoneSource {
    /// Creates a source with the given end-of-speech settings
    #[must_use]
    pub const fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    fn record(&self, capture: &mut AudioCapture) -> Vec<f32> {
        let mut detector = SpeechDetector::new();
        let mut buffer = UtteranceBuffer::new(&self.settings);
        let mut is_speech = |frame: &[f32]| detector.is_speech(frame);

        loop {
            std::thread::sleep(POLL_INTERVAL);
            let chunk = capture.drain_16khz_mono();
            if buffer.extend(&chunk, &mut is_speech) {
                break;
            }
        }

        buffer.into_samples()
    }

    fn dump_debug_wav(&self, samples: &[f32]) {
        let Some(dir) = &self.settings.debug_dir else {
            return;
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = dir.join(format!("utterance_{timestamp}.wav"));
        if let Err(e) = save_wav(samples, &path) {
            warn!("failed to save debug WAV: {e:#}");
        }
    }
}

impl UtteranceSource for MicrophoneSource {
    fn capture_utterance(&self) -> Result<Vec<u8>> {
        let _span = tracing::info_span!("capture_utterance").entered();
        let start = std::time::Instant::now();

        let mut capture = AudioCapture::new()?;
        capture.start_recording()?;
        let samples = self.record(&mut capture);
        capture.stop_recording()?;

        #[allow(clippy::cast_precision_loss)]
        let seconds = samples.len() as f32 / 16_000.0;
        info!(
            samples = samples.len(),
            seconds,
            elapsed_ms = start.elapsed().as_millis(),
            "utterance captured"
        );

        self.dump_debug_wav(&samples);
        encode_wav(&samples)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)] // ramp samples are exact integers
mod tests {
    use super::*;

    // Mock StreamControl for testing
    struct MockStreamControl {
        play_called: Arc<AtomicBool>,
        pause_called: Arc<AtomicBool>,
    }

    impl StreamControl for MockStreamControl {
        fn play(&self) -> Result<()> {
            self.play_called.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn pause(&self) -> Result<()> {
            self.pause_called.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn settings(silence_ms: u32, preroll_ms: u32) -> CaptureSettings {
        CaptureSettings {
            silence_ms,
            preroll_ms,
            max_utterance_secs: 10,
            debug_dir: None,
        }
    }

    /// Frames whose first sample is positive count as speech
    fn loud_frame() -> Vec<f32> {
        vec![0.5; FRAME_SAMPLES]
    }

    fn quiet_frame() -> Vec<f32> {
        vec![0.0; FRAME_SAMPLES]
    }

    #[test]
    fn test_stream_control_pause_resume() {
        let play_called = Arc::new(AtomicBool::new(false));
        let pause_called = Arc::new(AtomicBool::new(false));
        let mock_stream = MockStreamControl {
            play_called: Arc::clone(&play_called),
            pause_called: Arc::clone(&pause_called),
        };

        let (mut producer, consumer) = HeapRb::<f32>::new(1024).split();

        let mut capture = AudioCapture {
            stream_control: Some(Box::new(mock_stream)),
            ring_buffer_consumer: consumer,
            is_recording: Arc::new(AtomicBool::new(false)),
            device_sample_rate: 16000,
            device_channels: 1,
            resampler: StreamResampler::new(16000, 1),
        };

        capture.start_recording().unwrap();
        assert!(play_called.load(Ordering::Relaxed));
        assert!(capture.is_recording.load(Ordering::Relaxed));

        producer.push_slice(&[0.25, 0.5]);
        assert_eq!(capture.drain_16khz_mono(), vec![0.25, 0.5]);

        capture.stop_recording().unwrap();
        assert!(pause_called.load(Ordering::Relaxed));
        assert!(!capture.is_recording.load(Ordering::Relaxed));
    }

    #[test]
    fn test_drain_keeps_partial_stereo_frame() {
        let (mut producer, consumer) = HeapRb::<f32>::new(1024).split();
        let mut capture = AudioCapture {
            stream_control: None,
            ring_buffer_consumer: consumer,
            is_recording: Arc::new(AtomicBool::new(true)),
            device_sample_rate: 16000,
            device_channels: 2,
            resampler: StreamResampler::new(16000, 2),
        };

        producer.push_slice(&[1.0, 3.0, 5.0]);
        assert_eq!(capture.drain_16khz_mono(), vec![2.0]);

        producer.push_slice(&[7.0]);
        assert_eq!(capture.drain_16khz_mono(), vec![6.0]);
    }

    #[test]
    fn test_drains_at_48khz_add_no_samples_at_boundaries() {
        let (mut producer, consumer) = HeapRb::<f32>::new(48000).split();
        let mut capture = AudioCapture {
            stream_control: None,
            ring_buffer_consumer: consumer,
            is_recording: Arc::new(AtomicBool::new(true)),
            device_sample_rate: 48000,
            device_channels: 1,
            resampler: StreamResampler::new(48000, 1),
        };

        let ramp: Vec<f32> = (0..4800).map(|i| i as f32).collect();
        let mut drained = Vec::new();
        for chunk in ramp.chunks(1000) {
            producer.push_slice(chunk);
            drained.extend(capture.drain_16khz_mono());
        }

        assert_eq!(drained.len(), 1600);
        for (i, &sample) in drained.iter().enumerate() {
            assert_eq!(sample, (i * 3) as f32);
        }
    }

    #[test]
    fn test_start_recording_resets_resampler() {
        let (mut producer, consumer) = HeapRb::<f32>::new(1024).split();
        let mut capture = AudioCapture {
            stream_control: None,
            ring_buffer_consumer: consumer,
            is_recording: Arc::new(AtomicBool::new(false)),
            device_sample_rate: 48000,
            device_channels: 1,
            resampler: StreamResampler::new(48000, 1),
        };

        producer.push_slice(&[5.0; 5]);
        let _ = capture.drain_16khz_mono();

        capture.start_recording().unwrap();
        producer.push_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(capture.drain_16khz_mono(), vec![1.0]);
    }

    #[test]
    fn test_utterance_keeps_only_preroll_before_speech() {
        // 60 ms pre-roll = 2 frames, 60 ms silence ends the utterance
        let mut buffer = UtteranceBuffer::new(&settings(60, 60));
        let mut is_speech = |frame: &[f32]| frame[0] > 0.0;

        for _ in 0..10 {
            assert!(!buffer.extend(&quiet_frame(), &mut is_speech));
        }
        assert!(!buffer.extend(&loud_frame(), &mut is_speech));
        assert!(!buffer.extend(&quiet_frame(), &mut is_speech));
        assert!(buffer.extend(&quiet_frame(), &mut is_speech));

        let samples = buffer.into_samples();
        // 2 pre-roll + 1 speech + 2 trailing silence
        assert_eq!(samples.len(), FRAME_SAMPLES * 5);
    }

    #[test]
    fn test_utterance_handles_chunks_across_frame_boundaries() {
        let mut buffer = UtteranceBuffer::new(&settings(30, 0));
        let mut is_speech = |frame: &[f32]| frame[0] > 0.0;

        let loud = loud_frame();
        let (head, tail) = loud.split_at(100);
        assert!(!buffer.extend(head, &mut is_speech));
        assert!(!buffer.extend(tail, &mut is_speech));
        assert!(buffer.extend(&quiet_frame(), &mut is_speech));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_audio_capture_initialization() {
        let capture = AudioCapture::new().unwrap();
        assert!(capture.device_sample_rate > 0);
        assert!(capture.device_channels > 0);
    }

    #[test]
    #[ignore = "requires audio hardware and someone speaking"]
    fn test_capture_utterance_from_microphone() {
        let source = MicrophoneSource::new(settings(800, 300));
        let wav = source.capture_utterance().unwrap();
        assert!(!wav.is_empty());
    }
}
