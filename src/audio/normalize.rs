//! Audio normalization for the inference engine
//!
//! The engine only accepts mono, 16kHz, 32-bit float PCM with every sample in
//! [-1, 1]. Normalization runs in three steps:
//! 1. channel reduction by sample-wise averaging
//! 2. linear-interpolation resampling to 16kHz
//! 3. peak limiting (downscale only, never amplify)

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::file::{AudioDecoder, DecodedAudio, SymphoniaDecoder};
use crate::error::AudioError;

/// Sample rate required by the inference engine
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Mono 16kHz float PCM, all samples within [-1, 1]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedAudio {
    pub samples: Vec<f32>,
}

impl NormalizedAudio {
    pub fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / TARGET_SAMPLE_RATE as f64
    }

    /// Samples as little-endian f32 bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Encode as a 32-bit float mono WAV file
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }
}

/// Stateless converter from arbitrary audio bytes to `NormalizedAudio`
#[derive(Clone)]
pub struct AudioNormalizer {
    decoder: Arc<dyn AudioDecoder>,
}

impl Default for AudioNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNormalizer {
    pub fn new() -> Self {
        Self::with_decoder(Arc::new(SymphoniaDecoder::new()))
    }

    pub fn with_decoder(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode and normalize raw audio bytes
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedAudio, AudioError> {
        let decoded = self.decoder.decode(bytes)?;
        Ok(normalize_decoded(&decoded))
    }

    /// Read, decode and normalize an audio file
    pub fn normalize_file(&self, path: impl AsRef<Path>) -> Result<NormalizedAudio, AudioError> {
        let bytes = std::fs::read(path.as_ref())?;
        self.normalize(&bytes)
    }

    /// Normalize on the blocking pool so decode and resampling never stall
    /// the async executor
    pub async fn normalize_async(&self, bytes: Arc<Vec<u8>>) -> Result<NormalizedAudio, AudioError> {
        let normalizer = self.clone();
        tokio::task::spawn_blocking(move || normalizer.normalize(&bytes))
            .await
            .map_err(|e| {
                AudioError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("normalization task failed: {}", e),
                ))
            })?
    }
}

/// Normalize already-decoded audio
pub fn normalize_decoded(decoded: &DecodedAudio) -> NormalizedAudio {
    let mono = downmix(&decoded.channels);
    let mut samples = resample_linear(&mono, decoded.sample_rate, TARGET_SAMPLE_RATE);
    let peak = peak_limit(&mut samples);

    debug!(
        "Normalized {} channel(s) {}Hz → mono {}Hz: {} → {} samples (peak {:.3})",
        decoded.channels.len(),
        decoded.sample_rate,
        TARGET_SAMPLE_RATE,
        mono.len(),
        samples.len(),
        peak
    );

    NormalizedAudio { samples }
}

/// Reduce channels to mono by averaging across channels at each time index
pub fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [] => Vec::new(),
        [mono] => mono.clone(),
        _ => {
            let count = channels.len() as f32;
            let length = channels.iter().map(Vec::len).max().unwrap_or(0);

            (0..length)
                .map(|i| {
                    let sum: f32 = channels.iter().map(|c| c.get(i).copied().unwrap_or(0.0)).sum();
                    sum / count
                })
                .collect()
        }
    }
}

/// Linear-interpolation resampling
///
/// Output length is `round(len / (source_rate / target_rate))`. Output
/// sample `i` interpolates between the two source samples bracketing
/// position `i * ratio`; past the last pair it takes the last sample.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let new_length = (samples.len() as f64 / ratio).round() as usize;

    (0..new_length)
        .map(|i| {
            let position = i as f64 * ratio;
            let index = position.floor() as usize;
            let fraction = (position - index as f64) as f32;

            if index + 1 < samples.len() {
                samples[index] * (1.0 - fraction) + samples[index + 1] * fraction
            } else {
                samples.get(index).copied().unwrap_or(0.0)
            }
        })
        .collect()
}

/// Scale samples down so the peak is exactly 1.0 if it exceeds 1.0
///
/// Returns the peak absolute value before limiting.
pub fn peak_limit(samples: &mut [f32]) -> f32 {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));

    if peak > 1.0 {
        info!("Audio peak {:.3} exceeds 1.0, scaling down", peak);
        for sample in samples.iter_mut() {
            *sample /= peak;
        }
    }

    peak
}
