use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::attachment::{Attachment, MediaKind};
use super::config::{clamp_window, ChatConfig};
use super::engine::{EngineHandle, InferenceEngine, PartialSender};
use super::history::{ConversationHistory, PendingTurn};
use super::message::Message;
use super::model::{ModelConfig, ModelConfigPatch};
use super::prompt::{AudioRef, ImageRef, MediaInput, Prompt, PromptBuilder};
use crate::audio::AudioNormalizer;
use crate::error::ChatError;

/// Result of a completed turn
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Full assistant response
    pub reply: String,

    /// The committed user message
    pub user: Message,

    /// The committed assistant message
    pub assistant: Message,

    /// Audio attachments sent unnormalized because normalization failed
    pub audio_fallbacks: usize,
}

/// The single live engine handle
///
/// Dropping the slot releases the handle, so swapping or clearing the slot
/// can never leak a loaded model.
struct ModelSlot {
    handle: Arc<dyn EngineHandle>,
    config: ModelConfig,
    epoch: u64,
}

impl Drop for ModelSlot {
    fn drop(&mut self) {
        self.handle.release();
        info!("Released model: {}", self.config.name);
    }
}

/// Marks a generation as in flight; concurrent sends are rejected
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ChatError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self(flag))
            .map_err(|_| ChatError::Busy)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Publishes the in-flight turn and clears it when the send ends, including
/// when the send future is dropped before completion
struct PendingGuard<'a>(&'a StdMutex<Option<PendingTurn>>);

impl<'a> PendingGuard<'a> {
    fn publish(slot: &'a StdMutex<Option<PendingTurn>>, user: Message) -> Self {
        *lock_pending(slot) = Some(PendingTurn::new(user));
        Self(slot)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.0).take();
    }
}

fn lock_pending(slot: &StdMutex<Option<PendingTurn>>) -> MutexGuard<'_, Option<PendingTurn>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A chat conversation against an inference engine
///
/// Owns the conversation history and the active model. One generation runs
/// at a time: a `send()` while another is in flight fails with
/// `ChatError::Busy`.
pub struct ChatSession {
    engine: Arc<dyn InferenceEngine>,
    normalizer: AudioNormalizer,
    config: ChatConfig,
    window: AtomicUsize,
    slot: Mutex<Option<ModelSlot>>,
    load_lock: Mutex<()>,
    history: Mutex<ConversationHistory>,
    /// Never held across an await
    pending: StdMutex<Option<PendingTurn>>,
    /// Bumped whenever the live handle is released; generations started
    /// under an older epoch are discarded
    epoch: AtomicU64,
    busy: AtomicBool,
}

impl ChatSession {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: ChatConfig) -> Self {
        let window = clamp_window(config.context_window);
        info!(
            "Creating chat session (engine: {}, context window: {})",
            engine.name(),
            window
        );

        Self {
            engine,
            normalizer: AudioNormalizer::new(),
            config,
            window: AtomicUsize::new(window),
            slot: Mutex::new(None),
            load_lock: Mutex::new(()),
            history: Mutex::new(ConversationHistory::new()),
            pending: StdMutex::new(None),
            epoch: AtomicU64::new(0),
            busy: AtomicBool::new(false),
        }
    }

    /// Use a custom normalizer for audio attachments
    pub fn with_normalizer(mut self, normalizer: AudioNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Load a model, releasing the current one first
    ///
    /// If the new model fails to load, the previous model is loaded again so
    /// the session ends up where it started.
    pub async fn load_model(&self, config: ModelConfig) -> Result<(), ChatError> {
        let _loading = self.load_lock.lock().await;
        info!("Loading model {} ({}) via {}", config.name, config.path, self.engine.name());

        let previous = self.slot.lock().await.take();
        let previous_config = previous.as_ref().map(|slot| slot.config.clone());
        if let Some(previous) = previous {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            info!("Releasing model {} before loading {}", previous.config.name, config.name);
            drop(previous);
        }

        match self.engine.load(&config).await {
            Ok(handle) => {
                info!("Model loaded: {}", config.name);
                self.install(handle, config).await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load model {}: {:#}", config.name, e);

                if let Some(previous_config) = previous_config {
                    match self.engine.load(&previous_config).await {
                        Ok(handle) => {
                            info!("Restored previous model: {}", previous_config.name);
                            self.install(handle, previous_config).await;
                        }
                        Err(restore_err) => {
                            error!(
                                "Failed to restore previous model {}: {:#}",
                                previous_config.name, restore_err
                            );
                        }
                    }
                }

                Err(ChatError::ModelInit(e))
            }
        }
    }

    async fn install(&self, handle: Box<dyn EngineHandle>, config: ModelConfig) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.slot.lock().await = Some(ModelSlot {
            handle: Arc::from(handle),
            config,
            epoch,
        });
    }

    /// Merge `patch` into the current config and reload the model
    pub async fn reconfigure(&self, patch: ModelConfigPatch) -> Result<(), ChatError> {
        let current = self.current_config().await.ok_or(ChatError::NoModelLoaded)?;
        let merged = patch.apply(&current);
        info!("Reconfiguring model {}", merged.name);
        self.load_model(merged).await
    }

    /// Release the model and forget its config. Safe to call repeatedly.
    pub async fn dispose(&self) {
        let _loading = self.load_lock.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(slot) = self.slot.lock().await.take() {
            info!("Disposing model: {}", slot.config.name);
            drop(slot);
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub async fn current_config(&self) -> Option<ModelConfig> {
        self.slot.lock().await.as_ref().map(|slot| slot.config.clone())
    }

    /// Send a user turn and wait for the assistant reply
    ///
    /// With `partials`, the reply is streamed: every cumulative update is
    /// forwarded in order, and the call resolves once the final update
    /// arrives. The user message and the reply are appended to the history
    /// together, only after the reply is complete.
    pub async fn send(
        &self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
        partials: Option<PartialSender>,
    ) -> Result<SendOutcome, ChatError> {
        let _busy = BusyGuard::acquire(&self.busy)?;

        let (handle, epoch, model) = {
            let slot = self.slot.lock().await;
            let slot = slot.as_ref().ok_or(ChatError::NotReady)?;
            (Arc::clone(&slot.handle), slot.epoch, slot.config.clone())
        };

        for attachment in &attachments {
            attachment.validate()?;
        }

        if !attachments.is_empty() && !model.supports_multimodal {
            warn!(
                "Model {} is not multimodal, sending {} attachment(s) anyway",
                model.name,
                attachments.len()
            );
        }

        let text = text.into();
        let (media, audio_fallbacks) = self.prepare_media(&attachments).await?;

        let prompt = {
            let history = self.history.lock().await;
            let window = if self.config.include_context {
                self.context_window()
            } else {
                0
            };
            PromptBuilder::build(history.messages(), &text, window, media)
        };

        let user = Message::user(text, attachments);
        let pending = PendingGuard::publish(&self.pending, user.clone());

        debug!(
            "Generating with {} ({} prompt chars, multimodal: {}, streamed: {})",
            model.name,
            prompt.text().len(),
            prompt.is_multimodal(),
            partials.is_some()
        );

        let result = match partials {
            Some(sink) => self.generate_streamed(handle.as_ref(), &prompt, epoch, sink).await,
            None => handle.generate(&prompt).await.map_err(ChatError::Generation),
        };
        drop(pending);

        // A released model's outcome is stale, whether it replied or failed
        if self.epoch.load(Ordering::SeqCst) != epoch {
            warn!("Discarding result from superseded model {}", model.name);
            return Err(ChatError::Superseded);
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                error!("Generation failed: {}", e);
                return Err(e);
            }
        };

        let assistant = Message::assistant(reply.clone());
        {
            let mut history = self.history.lock().await;
            history.push_turn(user.clone(), assistant.clone(), self.context_window() * 2);
            debug!("History now holds {} messages", history.len());
        }

        info!("Turn complete: {} chars from {}", reply.len(), model.name);

        Ok(SendOutcome {
            reply,
            user,
            assistant,
            audio_fallbacks,
        })
    }

    async fn generate_streamed(
        &self,
        handle: &dyn EngineHandle,
        prompt: &Prompt,
        epoch: u64,
        sink: PartialSender,
    ) -> Result<String, ChatError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generation = handle.generate_streaming(prompt, tx);
        tokio::pin!(generation);
        let mut generation_finished = false;

        loop {
            tokio::select! {
                result = &mut generation, if !generation_finished => {
                    generation_finished = true;
                    result.map_err(ChatError::Generation)?;
                }

                partial = rx.recv() => {
                    let Some(partial) = partial else {
                        return Err(ChatError::Generation(anyhow!(
                            "engine stream ended before completion"
                        )));
                    };

                    if self.epoch.load(Ordering::SeqCst) != epoch {
                        warn!("Dropping partial response from superseded model");
                        return Err(ChatError::Superseded);
                    }

                    if let Some(pending) = lock_pending(&self.pending).as_mut() {
                        pending.advance(&partial.text).map_err(ChatError::Generation)?;
                    }

                    let done = partial.done;
                    let text = partial.text.clone();
                    if sink.send(partial).is_err() {
                        debug!("Partial response subscriber went away");
                    }

                    if done {
                        return Ok(text);
                    }
                }
            }
        }
    }

    async fn prepare_media(&self, attachments: &[Attachment]) -> Result<(Vec<MediaInput>, usize), ChatError> {
        let mut media = Vec::with_capacity(attachments.len());
        let mut fallbacks = 0;

        for attachment in attachments {
            match attachment.kind {
                MediaKind::Image => media.push(MediaInput::Image(ImageRef::from(attachment))),
                MediaKind::Audio => {
                    match self.normalizer.normalize_async(Arc::clone(&attachment.data)).await {
                        Ok(audio) => {
                            debug!(
                                "Normalized {}: {:.2}s, {} samples",
                                attachment.name,
                                audio.duration_seconds(),
                                audio.len()
                            );
                            media.push(MediaInput::Audio(AudioRef::Normalized {
                                name: attachment.name.clone(),
                                audio: Arc::new(audio),
                            }));
                        }
                        Err(e) if self.config.raw_audio_fallback => {
                            warn!(
                                "Audio normalization failed for {}, sending raw audio instead: {}",
                                attachment.name, e
                            );
                            fallbacks += 1;
                            media.push(MediaInput::Audio(AudioRef::Raw {
                                name: attachment.name.clone(),
                                mime_type: attachment.mime_type.clone(),
                                data: Arc::clone(&attachment.data),
                            }));
                        }
                        Err(e) => {
                            error!("Audio normalization failed for {}: {}", attachment.name, e);
                            return Err(e.into());
                        }
                    }
                }
            }
        }

        Ok((media, fallbacks))
    }

    /// Number of history entries rendered into each prompt
    pub fn context_window(&self) -> usize {
        self.window.load(Ordering::SeqCst)
    }

    /// Set the context window, clamped to 1..=50. Returns the value applied.
    /// History is trimmed to the new bound on the next completed turn.
    pub fn set_context_window(&self, window: usize) -> usize {
        let window = clamp_window(window);
        self.window.store(window, Ordering::SeqCst);
        info!("Context window set to {}", window);
        window
    }

    /// Snapshot of the committed history
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.messages().to_vec()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
        info!("Chat history cleared");
    }

    /// The turn currently being generated, if any
    pub fn pending_turn(&self) -> Option<PendingTurn> {
        lock_pending(&self.pending).clone()
    }

    /// Assistant text streamed so far for the in-flight turn
    pub fn pending_reply(&self) -> Option<String> {
        lock_pending(&self.pending).as_ref().map(|turn| turn.reply().to_string())
    }
}
