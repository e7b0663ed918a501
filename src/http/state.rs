use std::sync::Arc;

use crate::audio::AudioNormalizer;
use crate::chat::ChatSession;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The chat session behind the API
    pub chat: Arc<ChatSession>,

    /// Normalizer for standalone audio conversion
    pub normalizer: AudioNormalizer,
}

impl AppState {
    pub fn new(chat: Arc<ChatSession>) -> Self {
        Self {
            chat,
            normalizer: AudioNormalizer::new(),
        }
    }
}
