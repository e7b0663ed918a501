// File-backed capture device
//
// Replays a decoded audio file as a stream of capture frames, paced like a
// live microphone when `realtime` is set. Requested format hints are ignored:
// frames carry the file's own sample rate and channel count.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureDevice, CaptureRequest};
use super::file::{AudioDecoder, SymphoniaDecoder};
use crate::error::{AudioError, RecorderError};

pub struct FileCaptureDevice {
    path: PathBuf,
    realtime: bool,
    paused: watch::Sender<bool>,
    pump: Option<JoinHandle<()>>,
    name: String,
}

impl FileCaptureDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self {
            path,
            realtime: true,
            paused: watch::Sender::new(false),
            pump: None,
            name,
        }
    }

    /// Deliver frames as fast as the consumer accepts them
    pub fn without_pacing(mut self) -> Self {
        self.realtime = false;
        self
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FileCaptureDevice {
    async fn open(&mut self, request: &CaptureRequest) -> Result<mpsc::Receiver<AudioFrame>, RecorderError> {
        if self.pump.is_some() {
            return Err(RecorderError::Capture(format!("{} is already open", self.name)));
        }

        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                RecorderError::Unsupported(format!("capture file {} does not exist", self.path.display()))
            }
            std::io::ErrorKind::PermissionDenied => RecorderError::Permission(e.to_string()),
            _ => RecorderError::Capture(e.to_string()),
        })?;

        let decoder = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => SymphoniaDecoder::with_extension(ext),
            None => SymphoniaDecoder::new(),
        };
        let audio = decoder
            .decode(&bytes)
            .map_err(|e: AudioError| RecorderError::Capture(e.to_string()))?;

        let sample_rate = audio.sample_rate;
        let channels = audio.channels.len().max(1) as u16;
        let frames_per_block =
            ((sample_rate as u64 * request.buffer_duration_ms.max(1)) / 1000).max(1) as usize;

        // Re-interleave so frames look like device output
        let total_frames = audio.frame_count();
        let mut interleaved = Vec::with_capacity(total_frames * channels as usize);
        for i in 0..total_frames {
            for channel in &audio.channels {
                interleaved.push(channel.get(i).copied().unwrap_or(0.0));
            }
        }

        info!(
            "Opened {} ({}Hz, {} channels; requested {}Hz, {} channels)",
            self.name, sample_rate, channels, request.sample_rate, request.channels
        );

        let (tx, rx) = mpsc::channel(64);
        self.paused.send_replace(false);
        let mut paused = self.paused.subscribe();
        let realtime = self.realtime;
        let block_duration = Duration::from_millis(request.buffer_duration_ms.max(1));

        let pump = tokio::spawn(async move {
            let block_len = frames_per_block * channels as usize;
            let mut timestamp_ms = 0u64;

            for block in interleaved.chunks(block_len) {
                while *paused.borrow_and_update() {
                    if paused.changed().await.is_err() {
                        return;
                    }
                }

                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                timestamp_ms += (frame.frame_count() as u64 * 1000) / sample_rate.max(1) as u64;

                if tx.send(frame).await.is_err() {
                    debug!("Capture consumer went away");
                    return;
                }

                if realtime {
                    tokio::time::sleep(block_duration).await;
                }
            }

            debug!("Capture file exhausted");
            // Behave like a live device: stay open until released
            tx.closed().await;
        });

        self.pump = Some(pump);
        Ok(rx)
    }

    fn pause(&mut self) {
        self.paused.send_replace(true);
    }

    fn resume(&mut self) {
        self.paused.send_replace(false);
    }

    fn release(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            info!("Released {}", self.name);
        }
    }

    fn is_capturing(&self) -> bool {
        self.pump.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FileCaptureDevice {
    fn drop(&mut self) {
        self.release();
    }
}
