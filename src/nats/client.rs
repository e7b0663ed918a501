use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_nats::Client;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::messages::{
    reply_subject, GenerateChunk, GenerateRequest, LoadModelReply, LoadModelRequest,
    ReleaseModelMessage, WirePart, SUBJECT_GENERATE, SUBJECT_MODEL_LOAD, SUBJECT_MODEL_RELEASE,
};
use crate::chat::{EngineHandle, InferenceEngine, ModelConfig, PartialResponse, PartialSender, Prompt};

/// Inference engine reached over NATS
pub struct NatsInferenceEngine {
    client: Client,
    request_timeout: Duration,
}

impl NatsInferenceEngine {
    /// Connect to NATS server
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            request_timeout,
        })
    }
}

#[async_trait::async_trait]
impl InferenceEngine for NatsInferenceEngine {
    async fn load(&self, config: &ModelConfig) -> Result<Box<dyn EngineHandle>> {
        let model_id = format!("model-{}", uuid::Uuid::new_v4());
        let request = LoadModelRequest {
            model_id: model_id.clone(),
            config: config.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload = serde_json::to_vec(&request)?;

        info!("Requesting model load on {} ({} as {})", SUBJECT_MODEL_LOAD, config.name, model_id);

        let reply = tokio::time::timeout(
            self.request_timeout,
            self.client.request(SUBJECT_MODEL_LOAD.to_string(), payload.into()),
        )
        .await
        .context("Timed out waiting for model load")?
        .context("Model load request failed")?;

        let reply: LoadModelReply =
            serde_json::from_slice(&reply.payload).context("Invalid model load reply")?;
        if !reply.ok {
            bail!(
                "Engine rejected model {}: {}",
                config.name,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        Ok(Box::new(NatsEngineHandle {
            client: self.client.clone(),
            model_id,
            request_timeout: self.request_timeout,
            released: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// A model loaded by the remote engine
pub struct NatsEngineHandle {
    client: Client,
    model_id: String,
    request_timeout: Duration,
    released: AtomicBool,
}

impl NatsEngineHandle {
    async fn run(&self, prompt: &Prompt, partials: Option<&PartialSender>) -> Result<String> {
        if self.released.load(Ordering::SeqCst) {
            bail!("Model {} has been released", self.model_id);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let subject = reply_subject(&request_id);

        // Subscribe before publishing so no chunk is missed
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to generation output")?;

        let request = GenerateRequest {
            request_id: request_id.clone(),
            model_id: self.model_id.clone(),
            parts: WirePart::from_prompt(prompt),
            stream: partials.is_some(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload = serde_json::to_vec(&request)?;

        self.client
            .publish(SUBJECT_GENERATE.to_string(), payload.into())
            .await
            .context("Failed to publish generation request")?;

        debug!("Published generation request {} (reply on {})", request_id, subject);

        loop {
            let message = tokio::time::timeout(self.request_timeout, subscriber.next())
                .await
                .context("Timed out waiting for engine output")?
                .context("Engine output stream closed")?;

            let chunk: GenerateChunk =
                serde_json::from_slice(&message.payload).context("Invalid generation chunk")?;
            if chunk.request_id != request_id {
                continue;
            }

            if let Some(error) = chunk.error {
                bail!("Engine error: {}", error);
            }

            if let Some(tx) = partials {
                let partial = PartialResponse {
                    text: chunk.text.clone(),
                    done: chunk.done,
                };
                if tx.send(partial).is_err() {
                    debug!("Partial receiver dropped for request {}", request_id);
                }
            }

            if chunk.done {
                return Ok(chunk.text);
            }
        }
    }
}

#[async_trait::async_trait]
impl EngineHandle for NatsEngineHandle {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.run(prompt, None).await
    }

    async fn generate_streaming(&self, prompt: &Prompt, partials: PartialSender) -> Result<()> {
        self.run(prompt, Some(&partials)).await.map(|_| ())
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        let message = ReleaseModelMessage {
            model_id: self.model_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode release for {}: {}", self.model_id, e);
                return;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let client = self.client.clone();
                let model_id = self.model_id.clone();
                runtime.spawn(async move {
                    if let Err(e) = client
                        .publish(SUBJECT_MODEL_RELEASE.to_string(), payload.into())
                        .await
                    {
                        warn!("Failed to publish release for {}: {}", model_id, e);
                    }
                });
                info!("Released remote model {}", self.model_id);
            }
            Err(_) => warn!("No runtime to publish release for {}", self.model_id),
        }
    }
}
