use std::path::Path;

use serde::{Deserialize, Serialize};

/// Engine configuration for one loaded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Display name
    pub name: String,

    /// Model asset path or URL understood by the engine
    pub path: String,

    /// Maximum tokens (prompt + response)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Whether the model accepts image and audio prompt parts
    #[serde(default)]
    pub supports_multimodal: bool,
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_top_k() -> u32 {
    40
}

fn default_temperature() -> f32 {
    0.8
}

fn default_random_seed() -> u64 {
    101
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>, supports_multimodal: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            max_tokens: default_max_tokens(),
            top_k: default_top_k(),
            temperature: default_temperature(),
            random_seed: default_random_seed(),
            supports_multimodal,
        }
    }

    /// Config for a model file on disk; multimodal support is inferred from
    /// the file name (`e2b`, `e4b` or `multimodal`)
    pub fn from_local_file(path: impl AsRef<Path>, name: Option<String>) -> Self {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let lower = file_name.to_lowercase();
        let supports_multimodal =
            lower.contains("e2b") || lower.contains("e4b") || lower.contains("multimodal");

        Self::new(
            name.unwrap_or(file_name),
            path.display().to_string(),
            supports_multimodal,
        )
    }
}

/// Partial update for `ChatSession::reconfigure`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfigPatch {
    pub name: Option<String>,
    pub path: Option<String>,
    pub max_tokens: Option<u32>,
    pub top_k: Option<u32>,
    pub temperature: Option<f32>,
    pub random_seed: Option<u64>,
    pub supports_multimodal: Option<bool>,
}

impl ModelConfigPatch {
    /// Merge the set fields over `base`
    pub fn apply(&self, base: &ModelConfig) -> ModelConfig {
        ModelConfig {
            name: self.name.clone().unwrap_or_else(|| base.name.clone()),
            path: self.path.clone().unwrap_or_else(|| base.path.clone()),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            top_k: self.top_k.unwrap_or(base.top_k),
            temperature: self.temperature.unwrap_or(base.temperature),
            random_seed: self.random_seed.unwrap_or(base.random_seed),
            supports_multimodal: self.supports_multimodal.unwrap_or(base.supports_multimodal),
        }
    }
}

/// Built-in model preset
#[derive(Debug, Clone, Serialize)]
pub struct ModelOption {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub path: &'static str,
    pub size: &'static str,
    pub supports_multimodal: bool,
}

impl ModelOption {
    pub fn to_config(&self) -> ModelConfig {
        ModelConfig::new(self.name, self.path, self.supports_multimodal)
    }
}

/// Known on-device models
pub const MODEL_CATALOG: &[ModelOption] = &[
    ModelOption {
        id: "gemma2-2b",
        name: "Gemma2-2B-IT",
        description: "Lightweight model for fast conversation",
        path: "gemma2-2b-it-int8-web.task.bin",
        size: "~1.2GB",
        supports_multimodal: false,
    },
    ModelOption {
        id: "gemma3-1b",
        name: "Gemma3-1B-IT",
        description: "Latest lightweight model",
        path: "gemma3-1b-it-int4-web.task",
        size: "~800MB",
        supports_multimodal: false,
    },
    ModelOption {
        id: "gemma3-e2b",
        name: "Gemma-3n-E2B",
        description: "Multimodal model accepting text, image and audio input",
        path: "gemma-3n-E2B-it-litert-lm-web.task",
        size: "~2.5GB",
        supports_multimodal: true,
    },
    ModelOption {
        id: "gemma3-e4b",
        name: "Gemma-3n-E4B",
        description: "High-capacity multimodal model accepting text, image and audio input",
        path: "gemma-3n-E4B-it-litert-lm-web.task",
        size: "~4.2GB",
        supports_multimodal: true,
    },
];

/// Look up a preset by id
pub fn find_model(id: &str) -> Option<&'static ModelOption> {
    MODEL_CATALOG.iter().find(|m| m.id == id)
}
