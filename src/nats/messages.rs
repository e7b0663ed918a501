use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::TARGET_SAMPLE_RATE;
use crate::chat::{AudioRef, ModelConfig, Prompt, PromptPart};

pub const SUBJECT_MODEL_LOAD: &str = "llm.model.load";
pub const SUBJECT_MODEL_RELEASE: &str = "llm.model.release";
pub const SUBJECT_GENERATE: &str = "llm.generate";

/// Subject the engine publishes generation output for `request_id` on
pub fn reply_subject(request_id: &str) -> String {
    format!("llm.generate.reply.{}", request_id)
}

/// Request/reply payload asking the engine to load a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadModelRequest {
    pub model_id: String,
    pub config: ModelConfig,
    pub timestamp: String, // RFC3339 timestamp
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadModelReply {
    pub model_id: String,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseModelMessage {
    pub model_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// Little-endian f32 mono PCM at 16kHz
    PcmF32le,
    /// The original upload bytes
    Raw,
}

/// One prompt part on the wire. Binary data is base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text {
        text: String,
    },
    Image {
        name: String,
        mime_type: String,
        data: String,
    },
    Audio {
        name: String,
        encoding: AudioEncoding,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
        data: String,
    },
}

impl WirePart {
    pub fn from_prompt(prompt: &Prompt) -> Vec<WirePart> {
        match prompt {
            Prompt::Text(text) => vec![WirePart::Text { text: text.clone() }],
            Prompt::Parts(parts) => parts.iter().map(WirePart::from_part).collect(),
        }
    }

    fn from_part(part: &PromptPart) -> WirePart {
        let b64 = base64::engine::general_purpose::STANDARD;
        match part {
            PromptPart::Text { text } => WirePart::Text { text: text.clone() },
            PromptPart::Image(image) => WirePart::Image {
                name: image.name.clone(),
                mime_type: image.mime_type.clone(),
                data: b64.encode(image.data.as_slice()),
            },
            PromptPart::Audio(AudioRef::Normalized { name, audio }) => WirePart::Audio {
                name: name.clone(),
                encoding: AudioEncoding::PcmF32le,
                mime_type: None,
                sample_rate: Some(TARGET_SAMPLE_RATE),
                data: b64.encode(audio.to_le_bytes()),
            },
            PromptPart::Audio(AudioRef::Raw { name, mime_type, data }) => WirePart::Audio {
                name: name.clone(),
                encoding: AudioEncoding::Raw,
                mime_type: Some(mime_type.clone()),
                sample_rate: None,
                data: b64.encode(data.as_slice()),
            },
        }
    }
}

/// Generation request published on `llm.generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub request_id: String,
    pub model_id: String,
    pub parts: Vec<WirePart>,
    pub stream: bool,
    pub timestamp: String,
}

/// Generation output received on the reply subject
///
/// `text` is cumulative. The last chunk has `done` set, or carries `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateChunk {
    pub request_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}
