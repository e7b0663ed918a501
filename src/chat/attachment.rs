use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

pub const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

pub const SUPPORTED_AUDIO_TYPES: &[&str] = &[
    "audio/mp3",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "audio/webm",
    "audio/m4a",
    "audio/aac",
];

/// Upload size limits
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_AUDIO_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    /// Classify a MIME type, ignoring parameters such as `;codecs=opus`
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if SUPPORTED_IMAGE_TYPES.contains(&essence.as_str()) {
            Some(MediaKind::Image)
        } else if SUPPORTED_AUDIO_TYPES.contains(&essence.as_str()) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    pub fn max_bytes(&self) -> usize {
        match self {
            MediaKind::Image => MAX_IMAGE_BYTES,
            MediaKind::Audio => MAX_AUDIO_BYTES,
        }
    }
}

/// Raw media attached to a user message
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub kind: MediaKind,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: usize,
    /// Raw file contents, shared with the prompt parts built from it
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
}

impl Attachment {
    pub fn image(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(MediaKind::Image, name.into(), mime_type.into(), data)
    }

    pub fn audio(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(MediaKind::Audio, name.into(), mime_type.into(), data)
    }

    /// Build an attachment whose kind is inferred from its MIME type
    pub fn from_mime(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, ChatError> {
        let mime_type = mime_type.into();
        let kind = MediaKind::from_mime(&mime_type).ok_or_else(|| {
            ChatError::InvalidAttachment(format!(
                "unsupported file type: {}. Supported images: {}. Supported audio: {}",
                mime_type,
                SUPPORTED_IMAGE_TYPES.join(", "),
                SUPPORTED_AUDIO_TYPES.join(", ")
            ))
        })?;
        Ok(Self::new(kind, name.into(), mime_type, data))
    }

    fn new(kind: MediaKind, name: String, mime_type: String, data: Vec<u8>) -> Self {
        Self {
            kind,
            name,
            mime_type,
            size_bytes: data.len(),
            data: Arc::new(data),
        }
    }

    /// Check the MIME type matches the kind and the size is within limits
    pub fn validate(&self) -> Result<(), ChatError> {
        match MediaKind::from_mime(&self.mime_type) {
            Some(kind) if kind == self.kind => {}
            _ => {
                return Err(ChatError::InvalidAttachment(format!(
                    "{} is not a supported {:?} type: {}",
                    self.name, self.kind, self.mime_type
                )))
            }
        }

        let max = self.kind.max_bytes();
        if self.size_bytes > max {
            return Err(ChatError::InvalidAttachment(format!(
                "{} is too large: {:.2}MB (limit {}MB)",
                self.name,
                self.size_bytes as f64 / (1024.0 * 1024.0),
                max / (1024 * 1024)
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_classification() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("audio/webm;codecs=opus"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_mime("Audio/WAV"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_mime("application/pdf"), None);
    }

    #[test]
    fn test_oversized_audio_is_rejected() {
        let attachment = Attachment::audio("long.wav", "audio/wav", vec![0; MAX_AUDIO_BYTES + 1]);
        assert!(matches!(attachment.validate(), Err(ChatError::InvalidAttachment(_))));

        let attachment = Attachment::audio("ok.wav", "audio/wav", vec![0; 1024]);
        assert!(attachment.validate().is_ok());
    }

    #[test]
    fn test_kind_must_match_mime() {
        let attachment = Attachment::image("clip.wav", "audio/wav", vec![1, 2, 3]);
        assert!(attachment.validate().is_err());
        assert!(Attachment::from_mime("notes.txt", "text/plain", vec![]).is_err());
    }
}
