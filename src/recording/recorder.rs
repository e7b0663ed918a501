use std::io::Cursor;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::clock::ElapsedClock;
use crate::audio::{AudioFrame, CaptureDevice, CaptureRequest};
use crate::error::RecorderError;

/// Recorder lifecycle: Idle → Recording → {Paused ⇄ Recording} → Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl RecorderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderStatus::Idle => "idle",
            RecorderStatus::Recording => "recording",
            RecorderStatus::Paused => "paused",
            RecorderStatus::Stopped => "stopped",
        }
    }

    fn is_active(&self) -> bool {
        matches!(self, RecorderStatus::Recording | RecorderStatus::Paused)
    }
}

/// Observable recording state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingState {
    /// Recording or paused
    pub is_recording: bool,

    pub is_paused: bool,

    /// Whole seconds captured so far, excluding paused intervals
    pub elapsed_seconds: u64,

    /// Last capture error, if any
    pub error: Option<String>,
}

/// Finalized recording
#[derive(Debug, Clone)]
pub struct RecordedBlob {
    /// Encoded file contents
    pub data: Vec<u8>,
    pub mime_type: String,
    /// Sample rate the device actually delivered
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_seconds: f64,
}

impl RecordedBlob {
    /// File name for the blob, with an extension matching its MIME type
    pub fn file_name(&self, stem: &str) -> String {
        let extension = if self.mime_type.contains("webm") {
            "webm"
        } else if self.mime_type.contains("mp4") {
            "mp4"
        } else if self.mime_type.contains("wav") {
            "wav"
        } else {
            "webm"
        };
        format!("{}.{}", stem, extension)
    }
}

/// Render seconds as `mm:ss`
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Notifications emitted by a `Recorder`
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    StateChanged(RecordingState),
    /// Emitted once per successful `stop()`
    DataAvailable(RecordedBlob),
    Error(String),
}

struct Shared {
    status: RecorderStatus,
    clock: ElapsedClock,
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    format_known: bool,
    error: Option<String>,
    reported_seconds: u64,
}

impl Shared {
    fn new(request: &CaptureRequest) -> Self {
        Self {
            status: RecorderStatus::Idle,
            clock: ElapsedClock::default(),
            samples: Vec::new(),
            sample_rate: request.sample_rate,
            channels: request.channels,
            format_known: false,
            error: None,
            reported_seconds: 0,
        }
    }

    fn snapshot(&self, now: Instant) -> RecordingState {
        RecordingState {
            is_recording: self.status.is_active(),
            is_paused: self.status == RecorderStatus::Paused,
            elapsed_seconds: self.clock.elapsed(now).as_secs(),
            error: self.error.clone(),
        }
    }

    fn capture(&mut self, frame: AudioFrame) {
        if self.status != RecorderStatus::Recording {
            return;
        }

        if !self.format_known {
            if frame.sample_rate != self.sample_rate || frame.channels != self.channels {
                debug!(
                    "Device delivers {}Hz/{}ch instead of requested {}Hz/{}ch",
                    frame.sample_rate, frame.channels, self.sample_rate, self.channels
                );
            }
            self.sample_rate = frame.sample_rate;
            self.channels = frame.channels;
            self.format_known = true;
        } else if frame.sample_rate != self.sample_rate || frame.channels != self.channels {
            warn!(
                "Dropping frame with mismatched format: {}Hz/{}ch (expected {}Hz/{}ch)",
                frame.sample_rate, frame.channels, self.sample_rate, self.channels
            );
            return;
        }

        self.samples.extend_from_slice(&frame.samples);
    }

    fn fail(&mut self, message: String) {
        self.status = RecorderStatus::Idle;
        self.samples.clear();
        self.clock.reset();
        self.error = Some(message);
    }
}

/// Capture device plus whether it is currently acquired
///
/// Dropping the slot releases the device, so the device is freed even
/// if the recorder is dropped mid-recording.
struct DeviceSlot {
    device: Box<dyn CaptureDevice>,
    held: bool,
}

impl DeviceSlot {
    fn release(&mut self) {
        if self.held {
            self.device.release();
            self.held = false;
            info!("Released capture device: {}", self.device.name());
        }
    }
}

impl Drop for DeviceSlot {
    fn drop(&mut self) {
        self.release();
    }
}

struct Collector {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

fn lock(shared: &StdMutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Microphone recorder
///
/// Owns one capture device and holds it only between `start()` and
/// `stop()`/`cancel()` (or an internal capture failure).
pub struct Recorder {
    request: CaptureRequest,
    shared: Arc<StdMutex<Shared>>,
    device: Arc<Mutex<DeviceSlot>>,
    events: broadcast::Sender<RecorderEvent>,
    collector: Option<Collector>,
}

impl Recorder {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self::with_request(device, CaptureRequest::default())
    }

    pub fn with_request(device: Box<dyn CaptureDevice>, request: CaptureRequest) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(StdMutex::new(Shared::new(&request))),
            request,
            device: Arc::new(Mutex::new(DeviceSlot { device, held: false })),
            events,
            collector: None,
        }
    }

    /// Subscribe to state changes, finalized data and errors
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> RecorderStatus {
        lock(&self.shared).status
    }

    pub fn state(&self) -> RecordingState {
        lock(&self.shared).snapshot(Instant::now())
    }

    /// Acquire the capture device and start recording
    pub async fn start(&mut self) -> Result<(), RecorderError> {
        let status = self.status();
        if status.is_active() {
            return Err(RecorderError::InvalidState(status.as_str(), "start"));
        }

        // Leftover collector from a failed lifecycle has already exited
        if let Some(collector) = self.collector.take() {
            collector.handle.abort();
        }

        let rx = {
            let mut slot = self.device.lock().await;
            info!("Acquiring capture device: {}", slot.device.name());

            match slot.device.open(&self.request).await {
                Ok(rx) => {
                    slot.held = true;
                    rx
                }
                Err(e) => {
                    slot.device.release();
                    drop(slot);
                    error!("Failed to start recording: {}", e);
                    self.fail(e.to_string());
                    return Err(e);
                }
            }
        };

        {
            let mut shared = lock(&self.shared);
            shared.status = RecorderStatus::Recording;
            shared.samples.clear();
            shared.sample_rate = self.request.sample_rate;
            shared.channels = self.request.channels;
            shared.format_known = false;
            shared.error = None;
            shared.reported_seconds = 0;
            shared.clock.start(Instant::now());
        }
        self.emit_state();

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(collect(
            rx,
            stop_rx,
            Arc::clone(&self.shared),
            Arc::clone(&self.device),
            self.events.clone(),
        ));
        self.collector = Some(Collector {
            stop: stop_tx,
            handle,
        });

        info!("Recording started");
        Ok(())
    }

    /// Freeze the duration counter and suspend capture. No-op unless recording.
    pub async fn pause(&mut self) {
        if self.status() != RecorderStatus::Recording {
            debug!("Ignoring pause while {}", self.status().as_str());
            return;
        }

        self.device.lock().await.device.pause();
        {
            let mut shared = lock(&self.shared);
            shared.clock.pause(Instant::now());
            shared.status = RecorderStatus::Paused;
        }
        self.emit_state();
        info!("Recording paused");
    }

    /// Resume capture after `pause`. No-op unless paused.
    pub async fn resume(&mut self) {
        if self.status() != RecorderStatus::Paused {
            debug!("Ignoring resume while {}", self.status().as_str());
            return;
        }

        self.device.lock().await.device.resume();
        {
            let mut shared = lock(&self.shared);
            shared.clock.resume(Instant::now());
            shared.status = RecorderStatus::Recording;
        }
        self.emit_state();
        info!("Recording resumed");
    }

    /// Finalize the capture into a single blob and release the device
    pub async fn stop(&mut self) -> Result<RecordedBlob, RecorderError> {
        let status = self.status();
        if !status.is_active() {
            return Err(RecorderError::InvalidState(status.as_str(), "stop"));
        }

        lock(&self.shared).clock.pause(Instant::now());
        self.shutdown_collector().await;
        self.device.lock().await.release();

        let (samples, sample_rate, channels) = {
            let mut shared = lock(&self.shared);
            if !shared.status.is_active() {
                // Capture failed while we were shutting down
                let message = shared.error.clone().unwrap_or_else(|| "capture failed".to_string());
                return Err(RecorderError::Capture(message));
            }
            (std::mem::take(&mut shared.samples), shared.sample_rate, shared.channels)
        };

        let blob = match encode_wav(&samples, sample_rate, channels) {
            Ok(blob) => blob,
            Err(e) => {
                error!("Failed to finalize recording: {}", e);
                self.fail(e.to_string());
                return Err(e.into());
            }
        };

        lock(&self.shared).status = RecorderStatus::Stopped;
        self.emit_state();
        let _ = self.events.send(RecorderEvent::DataAvailable(blob.clone()));

        info!(
            "Recording stopped: {:.1}s, {} bytes",
            blob.duration_seconds,
            blob.data.len()
        );

        Ok(blob)
    }

    /// Discard the capture and release the device. No-op unless recording.
    pub async fn cancel(&mut self) {
        if !self.status().is_active() {
            return;
        }

        self.shutdown_collector().await;
        self.device.lock().await.release();

        {
            let mut shared = lock(&self.shared);
            shared.status = RecorderStatus::Idle;
            shared.samples.clear();
            shared.clock.reset();
            shared.error = None;
        }
        self.emit_state();
        info!("Recording cancelled");
    }

    async fn shutdown_collector(&mut self) {
        if let Some(collector) = self.collector.take() {
            let _ = collector.stop.send(());
            if let Err(e) = collector.handle.await {
                error!("Capture collector task panicked: {}", e);
            }
        }
    }

    fn fail(&self, message: String) {
        let state = {
            let mut shared = lock(&self.shared);
            shared.fail(message.clone());
            shared.snapshot(Instant::now())
        };
        let _ = self.events.send(RecorderEvent::Error(message));
        let _ = self.events.send(RecorderEvent::StateChanged(state));
    }

    fn emit_state(&self) {
        let _ = self.events.send(RecorderEvent::StateChanged(self.state()));
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(collector) = self.collector.take() {
            collector.handle.abort();
        }
        // If the collector still holds the slot, the slot's own Drop releases it
        if let Ok(mut slot) = self.device.try_lock() {
            slot.release();
        }
    }
}

/// Drain device frames into the shared buffer and publish whole-second ticks
async fn collect(
    mut rx: mpsc::Receiver<AudioFrame>,
    mut stop_rx: oneshot::Receiver<()>,
    shared: Arc<StdMutex<Shared>>,
    device: Arc<Mutex<DeviceSlot>>,
    events: broadcast::Sender<RecorderEvent>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                while let Ok(frame) = rx.try_recv() {
                    lock(&shared).capture(frame);
                }
                return;
            }

            frame = rx.recv() => match frame {
                Some(frame) => {
                    lock(&shared).capture(frame);
                }
                None => {
                    let message = "capture stream ended unexpectedly".to_string();
                    error!("{}", message);
                    device.lock().await.release();

                    let state = {
                        let mut shared = lock(&shared);
                        shared.fail(message.clone());
                        shared.snapshot(Instant::now())
                    };
                    let _ = events.send(RecorderEvent::Error(message));
                    let _ = events.send(RecorderEvent::StateChanged(state));
                    return;
                }
            },

            _ = ticker.tick() => {
                let update = {
                    let mut shared = lock(&shared);
                    let state = shared.snapshot(Instant::now());
                    if shared.status == RecorderStatus::Recording
                        && state.elapsed_seconds > shared.reported_seconds
                    {
                        shared.reported_seconds = state.elapsed_seconds;
                        Some(state)
                    } else {
                        None
                    }
                };
                if let Some(state) = update {
                    let _ = events.send(RecorderEvent::StateChanged(state));
                }
            }
        }
    }
}

fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<RecordedBlob, hound::Error> {
    let spec = hound::WavSpec {
        channels: channels.max(1),
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    let frames = samples.len() / channels.max(1) as usize;
    Ok(RecordedBlob {
        data: cursor.into_inner(),
        mime_type: "audio/wav".to_string(),
        sample_rate,
        channels: channels.max(1),
        duration_seconds: frames as f64 / sample_rate.max(1) as f64,
    })
}
