use serde::{Deserialize, Serialize};

/// Smallest and largest accepted context window (turns)
pub const MIN_CONTEXT_WINDOW: usize = 1;
pub const MAX_CONTEXT_WINDOW: usize = 50;

/// Configuration for a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of most recent history entries rendered into each prompt.
    /// History itself keeps twice this many messages.
    /// Default: 10
    pub context_window: usize,

    /// Whether prompts include history at all
    pub include_context: bool,

    /// Pass the original upload to the engine when audio normalization
    /// fails, instead of failing the send. Degrades output quality.
    pub raw_audio_fallback: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_window: 10,
            include_context: true,
            raw_audio_fallback: false,
        }
    }
}

pub(crate) fn clamp_window(window: usize) -> usize {
    window.clamp(MIN_CONTEXT_WINDOW, MAX_CONTEXT_WINDOW)
}
