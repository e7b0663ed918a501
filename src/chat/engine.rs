use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::model::ModelConfig;
use super::prompt::Prompt;

/// Cumulative response text emitted during streamed generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResponse {
    /// Full response text so far
    pub text: String,
    /// Set on the final update, whose text is the complete response
    pub done: bool,
}

/// Producer side of a partial-response subscription. Dropping the receiver
/// unsubscribes.
pub type PartialSender = mpsc::UnboundedSender<PartialResponse>;

/// Inference engine capable of loading models
#[async_trait::async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Load a model and return a handle to it
    async fn load(&self, config: &ModelConfig) -> Result<Box<dyn EngineHandle>>;

    /// Get engine name for logging
    fn name(&self) -> &str;
}

/// A loaded model instance
#[async_trait::async_trait]
pub trait EngineHandle: Send + Sync {
    /// Generate a complete response
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// Generate a response, pushing cumulative partials into `partials`.
    /// The last partial has `done` set.
    async fn generate_streaming(&self, prompt: &Prompt, partials: PartialSender) -> Result<()>;

    /// Free the model. Must be idempotent.
    fn release(&self);
}
