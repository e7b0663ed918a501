use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::{Attachment, MediaKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering the message into a prompt
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
}

/// A single chat message
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,

    pub role: Role,

    /// Message text (for user turns with media, the accompanying text)
    pub content: String,

    pub timestamp: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Media sent with a user message
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// User message; the kind is image if any image is attached, else audio
    /// if any audio is attached, else text
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let kind = if attachments.iter().any(|a| a.kind == MediaKind::Image) {
            MessageKind::Image
        } else if attachments.iter().any(|a| a.kind == MediaKind::Audio) {
            MessageKind::Audio
        } else {
            MessageKind::Text
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
            attachments,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
        }
    }
}
