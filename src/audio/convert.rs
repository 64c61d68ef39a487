use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// Sample rate required by the whisper model
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

const UTTERANCE_SPEC: WavSpec = WavSpec {
    channels: 1,
    sample_rate: TARGET_SAMPLE_RATE,
    bits_per_sample: 32,
    sample_format: SampleFormat::Float,
};

/// Downmixes interleaved samples to mono and resamples them to 16 kHz
#[must_use]
pub fn to_16khz_mono(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<f32> {
    let _span = tracing::debug_span!("to_16khz_mono").entered();

    let mono_samples = downmix(samples, channels);

    if sample_rate == TARGET_SAMPLE_RATE || sample_rate == 0 || mono_samples.is_empty() {
        return mono_samples;
    }

    // Linear interpolation resampling
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    {
        let ratio = f64::from(sample_rate) / f64::from(TARGET_SAMPLE_RATE);
        let output_len = ((mono_samples.len() as f64) / ratio).ceil() as usize;
        let last = mono_samples.len() - 1;

        let resampled: Vec<f32> = (0..output_len)
            .map(|i| {
                let src_idx_f64 = (i as f64) * ratio;
                let src_idx_floor = (src_idx_f64.floor() as usize).min(last);
                let src_idx_ceil = (src_idx_floor + 1).min(last);
                let fract = src_idx_f64 - src_idx_f64.floor();

                lerp(mono_samples[src_idx_floor], mono_samples[src_idx_ceil], fract)
            })
            .collect();

        debug!(
            source_rate = sample_rate,
            input_samples = mono_samples.len(),
            output_samples = resampled.len(),
            "resampled audio"
        );

        resampled
    }
}

/// Averages interleaved frames down to one channel
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels_f64 = f64::from(channels);
    samples
        .chunks(usize::from(channels))
        .map(|frame| {
            let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 → f32: audio samples are stored as f32, precision sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum_f64 / channels_f64) as f32
            }
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn lerp(from: f32, to: f32, fract: f64) -> f32 {
    f64::from(from).mul_add(1.0 - fract, f64::from(to) * fract) as f32
}

/// Downmix and linear resample to 16 kHz for audio that arrives in chunks
///
/// The fractional read position and the last input sample carry over between
/// calls to [`push`](Self::push), so a signal fed in pieces resamples the same
/// as one fed whole. The final input sample is held back until more input
/// arrives.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    channels: u16,
    /// Input samples advanced per output sample
    step: f64,
    passthrough: bool,
    /// Read position relative to `carry`
    position: f64,
    carry: Option<f32>,
}

impl StreamResampler {
    #[must_use]
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let passthrough = sample_rate == TARGET_SAMPLE_RATE || sample_rate == 0;
        Self {
            channels,
            step: f64::from(sample_rate.max(1)) / f64::from(TARGET_SAMPLE_RATE),
            passthrough,
            position: 0.0,
            carry: None,
        }
    }

    /// Forgets the previous stream
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.carry = None;
    }

    /// Converts the next chunk of interleaved samples
    ///
    /// Chunks must hold whole frames.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        let mono = downmix(samples, self.channels);
        if self.passthrough {
            return mono;
        }

        let mut window = Vec::with_capacity(mono.len() + 1);
        window.extend(self.carry);
        window.extend_from_slice(&mono);
        if window.len() < 2 {
            self.carry = window.last().copied();
            return Vec::new();
        }

        let last = window.len() - 1;
        let end = last as f64;
        let mut resampled = Vec::with_capacity((end / self.step).ceil() as usize);
        while self.position < end {
            let floor = self.position.floor();
            let index = floor as usize;
            resampled.push(lerp(window[index], window[index + 1], self.position - floor));
            self.position += self.step;
        }

        self.position -= end;
        self.carry = Some(window[last]);
        resampled
    }
}

/// Encodes 16 kHz mono samples as an in-memory WAV file
///
/// # Errors
/// Returns error if the WAV writer fails
pub fn encode_wav(samples: &[f32]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, UTTERANCE_SPEC).context("failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("failed to write sample")?;
        }
        writer.finalize().context("failed to finalize WAV data")?;
    }
    Ok(cursor.into_inner())
}

/// Decodes WAV bytes into 16 kHz mono f32 samples
///
/// Integer and float encodings at any rate and channel count are accepted.
///
/// # Errors
/// Returns error if the bytes are not a readable WAV stream
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<f32>> {
    let mut reader = WavReader::new(Cursor::new(bytes)).context("failed to read WAV header")?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to read float samples")?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                bail!("unsupported bit depth: {}", spec.bits_per_sample);
            }
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .context("failed to read integer samples")?
        }
    };

    Ok(to_16khz_mono(&samples, spec.sample_rate, spec.channels))
}

/// Saves 16 kHz mono samples to a WAV file for debugging
///
/// # Errors
/// Returns error if directory creation or file write fails
pub fn save_wav(samples: &[f32], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create debug directory")?;
    }

    let mut writer = WavWriter::create(path, UTTERANCE_SPEC).context("failed to create WAV file")?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .context("failed to write sample")?;
    }
    writer.finalize().context("failed to finalize WAV file")?;

    info!(path = %path.display(), samples = samples.len(), "saved utterance WAV");
    Ok(())
}
