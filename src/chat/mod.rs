//! Chat with an on-device language model
//!
//! This module provides the `ChatSession` that manages:
//! - Model lifecycle (load, reconfigure, dispose) with a single live engine handle
//! - Prompt construction from bounded conversation history and attachments
//! - Buffered and streamed generation
//! - Turn commit once the reply is complete

mod attachment;
mod config;
mod engine;
mod history;
mod message;
mod model;
mod prompt;
mod session;

pub use attachment::{
    Attachment, MediaKind, MAX_AUDIO_BYTES, MAX_IMAGE_BYTES, SUPPORTED_AUDIO_TYPES,
    SUPPORTED_IMAGE_TYPES,
};
pub use config::{ChatConfig, MAX_CONTEXT_WINDOW, MIN_CONTEXT_WINDOW};
pub use engine::{EngineHandle, InferenceEngine, PartialResponse, PartialSender};
pub use history::{ConversationHistory, PendingTurn};
pub use message::{Message, MessageKind, Role};
pub use model::{find_model, ModelConfig, ModelConfigPatch, ModelOption, MODEL_CATALOG};
pub use prompt::{AudioRef, ImageRef, MediaInput, Prompt, PromptBuilder, PromptPart};
pub use session::{ChatSession, SendOutcome};
