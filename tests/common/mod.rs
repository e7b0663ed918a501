// Shared fakes and fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use loqa_chat::audio::{AudioFrame, CaptureDevice, CaptureRequest};
use loqa_chat::chat::{
    EngineHandle, InferenceEngine, ModelConfig, PartialResponse, PartialSender, Prompt,
};
use loqa_chat::RecorderError;
use tokio::sync::{mpsc, Notify};

/// Encode float samples as an in-memory WAV file
pub fn wav_bytes(channels: &[Vec<f32>], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            for channel in channels {
                writer.write_sample(channel[i]).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn sine(frames: usize, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Reply the fake engine gives for a prompt: echoes the new user line
pub fn reply_for(prompt: &Prompt) -> String {
    let user_line = prompt
        .text()
        .lines()
        .filter_map(|line| line.strip_prefix("User: "))
        .last()
        .unwrap_or("");
    format!("you said {}", user_line)
}

#[derive(Default)]
pub struct EngineStats {
    pub loads: AtomicUsize,
    pub releases: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub generations: AtomicUsize,
}

/// In-memory inference engine
///
/// Generation echoes the user's text. Streaming emits one cumulative
/// partial per word. A gated engine waits for `open_gate` before producing;
/// a stepped engine waits for `open_gate` before every partial.
pub struct FakeEngine {
    pub stats: Arc<EngineStats>,
    pub prompts: Arc<Mutex<Vec<Prompt>>>,
    pub started: Arc<Notify>,
    gate: Option<Arc<Notify>>,
    stepped: bool,
    failing: Mutex<HashSet<String>>,
    failing_generations: Arc<AtomicBool>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Arc::new(Notify::new()))))
    }

    pub fn stepped() -> Arc<Self> {
        let mut engine = Self::build(Some(Arc::new(Notify::new())));
        engine.stepped = true;
        Arc::new(engine)
    }

    fn build(gate: Option<Arc<Notify>>) -> Self {
        Self {
            stats: Arc::new(EngineStats::default()),
            prompts: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(Notify::new()),
            gate,
            stepped: false,
            failing: Mutex::new(HashSet::new()),
            failing_generations: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_loads_of(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Make every generation error out once it gets past the gate
    pub fn fail_generations(&self) {
        self.failing_generations.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InferenceEngine for FakeEngine {
    async fn load(&self, config: &ModelConfig) -> Result<Box<dyn EngineHandle>> {
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&config.name) {
            bail!("model file {} is corrupt", config.path);
        }

        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakeHandle {
            stats: Arc::clone(&self.stats),
            prompts: Arc::clone(&self.prompts),
            started: Arc::clone(&self.started),
            gate: self.gate.clone(),
            stepped: self.stepped,
            failing: Arc::clone(&self.failing_generations),
            released: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FakeHandle {
    stats: Arc<EngineStats>,
    prompts: Arc<Mutex<Vec<Prompt>>>,
    started: Arc<Notify>,
    gate: Option<Arc<Notify>>,
    stepped: bool,
    failing: Arc<AtomicBool>,
    released: AtomicBool,
}

impl FakeHandle {
    async fn begin(&self, prompt: &Prompt) -> Result<()> {
        self.stats.generations.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        self.started.notify_one();
        if !self.stepped {
            self.wait_gate().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("inference backend crashed");
        }
        Ok(())
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait::async_trait]
impl EngineHandle for FakeHandle {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.begin(prompt).await?;
        Ok(reply_for(prompt))
    }

    async fn generate_streaming(&self, prompt: &Prompt, partials: PartialSender) -> Result<()> {
        self.begin(prompt).await?;

        let reply = reply_for(prompt);
        let words: Vec<&str> = reply.split(' ').collect();
        for i in 1..=words.len() {
            if self.stepped {
                self.wait_gate().await;
            }
            let partial = PartialResponse {
                text: words[..i].join(" "),
                done: i == words.len(),
            };
            if partials.send(partial).is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.stats.releases.fetch_add(1, Ordering::SeqCst);
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// How a `FakeCaptureDevice` behaves on open
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceBehavior {
    Works,
    Denied,
    Missing,
}

#[derive(Default)]
pub struct DeviceStats {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub pauses: AtomicUsize,
}

/// Capture device fed by the test through `frames`
pub struct FakeCaptureDevice {
    behavior: DeviceBehavior,
    pub stats: Arc<DeviceStats>,
    feed: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    capturing: bool,
}

impl FakeCaptureDevice {
    pub fn new(behavior: DeviceBehavior) -> (Self, Arc<DeviceStats>, Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>) {
        let stats = Arc::new(DeviceStats::default());
        let feed = Arc::new(Mutex::new(None));
        let device = Self {
            behavior,
            stats: Arc::clone(&stats),
            feed: Arc::clone(&feed),
            capturing: false,
        };
        (device, stats, feed)
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FakeCaptureDevice {
    async fn open(&mut self, _request: &CaptureRequest) -> Result<mpsc::Receiver<AudioFrame>, RecorderError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            DeviceBehavior::Denied => Err(RecorderError::Permission("user denied microphone".into())),
            DeviceBehavior::Missing => Err(RecorderError::Unsupported("no microphone".into())),
            DeviceBehavior::Works => {
                let (tx, rx) = mpsc::channel(64);
                *self.feed.lock().unwrap() = Some(tx);
                self.capturing = true;
                Ok(rx)
            }
        }
    }

    fn pause(&mut self) {
        self.stats.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&mut self) {}

    fn release(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        self.capturing = false;
        self.feed.lock().unwrap().take();
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "fake-mic"
    }
}

/// One block of mono 16kHz audio
pub fn frame(samples: Vec<f32>) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    }
}
