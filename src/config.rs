use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::chat::{ChatConfig, ModelConfig};

/// Service configuration
///
/// Loaded from `config/loqa-chat.toml` when present, then overridden by
/// `LOQA_CHAT__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub engine: EngineConfig,
    pub chat: ChatConfig,

    /// Model to load at startup
    pub model: Option<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,

    /// Directory with the browser UI, served for unmatched paths
    pub static_dir: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-chat".to_string(),
            http: HttpConfig::default(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub nats_url: String,

    /// Upper bound on waiting for a model load or a generation chunk
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("LOQA_CHAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.service.name, "loqa-chat");
        assert_eq!(cfg.service.http.port, 3000);
        assert_eq!(cfg.chat.context_window, 10);
        assert!(!cfg.chat.raw_audio_fallback);
        assert!(cfg.model.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loqa-chat.toml");
        std::fs::write(
            &path,
            r#"
[service.http]
port = 8088

[chat]
context_window = 4
raw_audio_fallback = true

[model]
name = "Gemma3-1B-IT"
path = "gemma3-1b-it-int4-web.task"
"#,
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.service.http.port, 8088);
        assert_eq!(cfg.service.http.bind, "127.0.0.1");
        assert_eq!(cfg.chat.context_window, 4);
        assert!(cfg.chat.include_context);
        assert!(cfg.chat.raw_audio_fallback);

        let model = cfg.model.unwrap();
        assert_eq!(model.top_k, 40);
        assert!(!model.supports_multimodal);
        assert_eq!(cfg.engine.request_timeout(), Duration::from_secs(120));
    }
}
