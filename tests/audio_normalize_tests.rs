// Integration tests for audio normalization
//
// These tests verify that arbitrary input audio comes out as mono 16kHz
// float PCM within [-1, 1].

mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{sine, wav_bytes};
use loqa_chat::audio::{normalize_decoded, AudioNormalizer, DecodedAudio, TARGET_SAMPLE_RATE};
use loqa_chat::AudioError;

#[test]
fn test_8khz_second_becomes_16000_samples() -> Result<()> {
    let normalizer = AudioNormalizer::new();
    let audio = normalizer.normalize(&wav_bytes(&[sine(8000, 8000, 0.5)], 8000))?;

    assert_eq!(audio.len(), 16000);
    assert_eq!(audio.sample_rate(), TARGET_SAMPLE_RATE);
    assert!((audio.duration_seconds() - 1.0).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_opposite_stereo_channels_average_to_silence() -> Result<()> {
    let normalizer = AudioNormalizer::new();
    let bytes = wav_bytes(&[vec![0.5; 1600], vec![-0.5; 1600]], 16000);

    let audio = normalizer.normalize(&bytes)?;

    assert_eq!(audio.len(), 1600);
    assert!(audio.samples.iter().all(|&s| s == 0.0), "Averaging, not channel selection");

    Ok(())
}

#[test]
fn test_output_length_follows_source_rate() -> Result<()> {
    let normalizer = AudioNormalizer::new();

    for &rate in &[8000u32, 11025, 22050, 32000, 44100, 48000] {
        for &duration in &[0.25f64, 1.0, 1.7] {
            let frames = (duration * rate as f64).round() as usize;
            let audio = normalizer.normalize(&wav_bytes(&[sine(frames, rate, 0.3)], rate))?;

            let ratio = rate as f64 / TARGET_SAMPLE_RATE as f64;
            let expected = (frames as f64 / ratio).round() as i64;
            let diff = (audio.len() as i64 - expected).abs();
            assert!(
                diff <= 1,
                "{}Hz, {}s: got {} samples, expected {}",
                rate,
                duration,
                audio.len(),
                expected
            );
        }
    }

    Ok(())
}

#[test]
fn test_in_range_audio_is_untouched_and_idempotent() -> Result<()> {
    let normalizer = AudioNormalizer::new();
    let samples = sine(3200, 16000, 0.9);

    let once = normalizer.normalize(&wav_bytes(&[samples.clone()], 16000))?;
    assert_eq!(once.samples, samples);

    let twice = normalizer.normalize(&once.to_wav_bytes()?)?;
    assert_eq!(twice, once);

    Ok(())
}

#[test]
fn test_loud_audio_is_limited_to_unity_peak() {
    let decoded = DecodedAudio {
        sample_rate: 44100,
        channels: vec![sine(44100, 44100, 3.0), sine(44100, 44100, 1.0)],
    };

    let audio = normalize_decoded(&decoded);
    let peak = audio.samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));

    assert!((peak - 1.0).abs() < 1e-6, "peak was {}", peak);
}

#[test]
fn test_empty_audio_passes_through() {
    let decoded = DecodedAudio {
        sample_rate: 48000,
        channels: vec![Vec::new(), Vec::new()],
    };

    let audio = normalize_decoded(&decoded);
    assert!(audio.is_empty());
}

#[test]
fn test_normalization_is_deterministic() -> Result<()> {
    let normalizer = AudioNormalizer::new();
    let bytes = wav_bytes(&[sine(4410, 44100, 1.0), sine(4410, 44100, 0.2)], 44100);

    assert_eq!(normalizer.normalize(&bytes)?, normalizer.normalize(&bytes)?);

    Ok(())
}

#[test]
fn test_undecodable_bytes_fail_with_decode_error() {
    let normalizer = AudioNormalizer::new();
    let result = normalizer.normalize(&[0u8; 512]);

    assert!(matches!(result, Err(AudioError::Decode(_))));
}

#[test]
fn test_unreadable_source_fails_with_io_error() {
    let normalizer = AudioNormalizer::new();
    let result = normalizer.normalize_file("/nonexistent/voice-note.m4a");

    assert!(matches!(result, Err(AudioError::Io(_))));
}

#[tokio::test]
async fn test_async_normalization_matches_sync() -> Result<()> {
    let normalizer = AudioNormalizer::new();
    let bytes = wav_bytes(&[sine(2205, 22050, 0.4)], 22050);

    let sync = normalizer.normalize(&bytes)?;
    let async_result = normalizer.normalize_async(Arc::new(bytes)).await?;

    assert_eq!(sync, async_result);
    assert_eq!(async_result.len(), 1600);

    Ok(())
}

#[test]
fn test_wav_encoding_is_16khz_mono_float() -> Result<()> {
    let normalizer = AudioNormalizer::new();
    let audio = normalizer.normalize(&wav_bytes(&[vec![0.25; 800]], 8000))?;

    let reader = hound::WavReader::new(std::io::Cursor::new(audio.to_wav_bytes()?))?;
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    assert_eq!(reader.len() as usize, audio.len());

    // Little-endian transport encoding: 4 bytes per sample
    assert_eq!(audio.to_le_bytes().len(), audio.len() * 4);

    Ok(())
}
