use std::path::PathBuf;

use tokio::sync::mpsc;

use super::file_device::FileCaptureDevice;
use crate::error::RecorderError;

/// Captured audio block (32-bit float PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (f32 PCM, interleaved)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Number of sample frames (samples per channel) in this block
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Capture parameters requested from the device
///
/// These are hints: a device may deliver a different rate or channel
/// count, so consumers must read the format from each `AudioFrame`.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Preferred channel count (1 = mono)
    pub channels: u16,
    /// Preferred sample rate in Hz
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            channels: 1,             // Mono
            sample_rate: 16000,      // 16kHz preferred by the inference engine
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            buffer_duration_ms: 100, // 100ms frames
        }
    }
}

/// Audio capture device trait
///
/// Implementations:
/// - File: replays an audio file as if it were a microphone (testing/batch)
/// - Platform microphones plug in behind the same contract
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device and start capturing
    ///
    /// Returns a channel receiver that will receive audio frames. The
    /// channel closes when the device is released or fails.
    async fn open(&mut self, request: &CaptureRequest) -> Result<mpsc::Receiver<AudioFrame>, RecorderError>;

    /// Suspend frame delivery without releasing the device
    fn pause(&mut self);

    /// Resume frame delivery after `pause`
    fn resume(&mut self);

    /// Release the device. Must be idempotent.
    fn release(&mut self);

    /// Check if the device is currently held
    fn is_capturing(&self) -> bool;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Default system microphone
    Microphone,
    /// File input (for testing/batch processing)
    File(PathBuf),
}

/// Capture device factory
pub struct CaptureDeviceFactory;

impl CaptureDeviceFactory {
    /// Create a capture device for the given source
    pub fn create(source: CaptureSource) -> Result<Box<dyn CaptureDevice>, RecorderError> {
        match source {
            CaptureSource::Microphone => Err(RecorderError::Unsupported(
                "no microphone capture backend is available in this build".to_string(),
            )),
            CaptureSource::File(path) => Ok(Box::new(FileCaptureDevice::new(path))),
        }
    }

    /// Check whether a source can be captured from on this platform
    pub fn is_supported(source: &CaptureSource) -> bool {
        match source {
            CaptureSource::Microphone => false,
            CaptureSource::File(path) => path.is_file(),
        }
    }
}
