use std::sync::Arc;

use super::attachment::Attachment;
use super::message::{Message, Role};
use crate::audio::NormalizedAudio;

/// Image passed to the engine as-is
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub name: String,
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
}

impl From<&Attachment> for ImageRef {
    fn from(attachment: &Attachment) -> Self {
        Self {
            name: attachment.name.clone(),
            mime_type: attachment.mime_type.clone(),
            data: Arc::clone(&attachment.data),
        }
    }
}

/// Audio passed to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum AudioRef {
    /// Mono 16kHz float PCM
    Normalized {
        name: String,
        audio: Arc<NormalizedAudio>,
    },
    /// Original upload, used when normalization failed and fallback is enabled
    Raw {
        name: String,
        mime_type: String,
        data: Arc<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text { text: String },
    Image(ImageRef),
    Audio(AudioRef),
}

/// Media for the new turn, in the order it was attached
#[derive(Debug, Clone, PartialEq)]
pub enum MediaInput {
    Image(ImageRef),
    Audio(AudioRef),
}

/// What the inference engine receives
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Text(String),
    /// Ordered parts: the text block, then images, then audio
    Parts(Vec<PromptPart>),
}

impl Prompt {
    /// The textual context block of the prompt
    pub fn text(&self) -> &str {
        match self {
            Prompt::Text(text) => text,
            Prompt::Parts(parts) => parts
                .iter()
                .find_map(|p| match p {
                    PromptPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }

    pub fn is_multimodal(&self) -> bool {
        matches!(self, Prompt::Parts(_))
    }
}

/// Renders conversation history and a new user turn into a prompt
pub struct PromptBuilder;

impl PromptBuilder {
    /// Context block: the last `window` history entries as labeled lines,
    /// the new user line, then an open assistant marker
    pub fn context_block(history: &[Message], new_text: &str, window: usize) -> String {
        let start = history.len().saturating_sub(window);
        let mut prompt = String::new();

        for message in &history[start..] {
            prompt.push_str(message.role.label());
            prompt.push_str(": ");
            prompt.push_str(&message.content);
            prompt.push('\n');
        }

        prompt.push_str(Role::User.label());
        prompt.push_str(": ");
        prompt.push_str(new_text);
        prompt.push('\n');
        prompt.push_str(Role::Assistant.label());
        prompt.push(':');

        prompt
    }

    /// Plain text prompt, or a multi-part prompt when media is present
    pub fn build(history: &[Message], new_text: &str, window: usize, media: Vec<MediaInput>) -> Prompt {
        let text = Self::context_block(history, new_text, window);

        if media.is_empty() {
            return Prompt::Text(text);
        }

        let mut images = Vec::new();
        let mut audio = Vec::new();
        for input in media {
            match input {
                MediaInput::Image(image) => images.push(PromptPart::Image(image)),
                MediaInput::Audio(clip) => audio.push(PromptPart::Audio(clip)),
            }
        }

        let mut parts = Vec::with_capacity(1 + images.len() + audio.len());
        parts.push(PromptPart::Text { text });
        parts.extend(images);
        parts.extend(audio);

        Prompt::Parts(parts)
    }
}
