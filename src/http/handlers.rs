use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use base64::Engine;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::state::AppState;
use crate::chat::{
    find_model, Attachment, Message, ModelConfig, ModelConfigPatch, PartialResponse, SendOutcome,
};
use crate::error::{AudioError, ChatError};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AttachmentUpload {
    pub name: String,
    pub mime_type: String,
    /// Base64-encoded file contents
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub reply: String,
    pub user: Message,
    pub assistant: Message,
    pub audio_fallbacks: usize,
}

impl From<SendOutcome> for SendResponse {
    fn from(outcome: SendOutcome) -> Self {
        Self {
            reply: outcome.reply,
            user: outcome.user,
            assistant: outcome.assistant,
            audio_fallbacks: outcome.audio_fallbacks,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    /// Id of a built-in preset
    pub preset: Option<String>,

    /// Explicit config, used when no preset is given
    pub config: Option<ModelConfig>,
}

#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    pub ready: bool,
    pub config: Option<ModelConfig>,
    pub context_window: usize,
}

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub window: usize,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub window: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by handlers, rendered as an `ErrorResponse`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        let status = match &e {
            ChatError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Busy | ChatError::NoModelLoaded => StatusCode::CONFLICT,
            ChatError::InvalidAttachment(_) | ChatError::Audio(AudioError::Decode(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<AudioError> for ApiError {
    fn from(e: AudioError) -> Self {
        ChatError::Audio(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.message);
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

fn decode_attachments(uploads: Vec<AttachmentUpload>) -> Result<Vec<Attachment>, ChatError> {
    uploads
        .into_iter()
        .map(|upload| {
            let data = base64::engine::general_purpose::STANDARD
                .decode(upload.data.as_bytes())
                .map_err(|e| {
                    ChatError::InvalidAttachment(format!("{} is not valid base64: {}", upload.name, e))
                })?;
            Attachment::from_mime(upload.name, upload.mime_type, data)
        })
        .collect()
}

async fn model_status(state: &AppState) -> ModelStatusResponse {
    let config = state.chat.current_config().await;
    ModelStatusResponse {
        ready: config.is_some(),
        config,
        context_window: state.chat.context_window(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /model
pub async fn get_model(State(state): State<AppState>) -> Json<ModelStatusResponse> {
    Json(model_status(&state).await)
}

/// POST /model/load
/// Load a preset or an explicit model config, replacing the current model
pub async fn load_model(
    State(state): State<AppState>,
    Json(req): Json<LoadModelRequest>,
) -> Result<Json<ModelStatusResponse>, ApiError> {
    let config = match (req.preset, req.config) {
        (Some(id), _) => find_model(&id)
            .map(|option| option.to_config())
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Unknown model preset: {}", id)))?,
        (None, Some(config)) => config,
        (None, None) => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Either preset or config is required",
            ))
        }
    };

    info!("HTTP request to load model {}", config.name);
    state.chat.load_model(config).await?;

    Ok(Json(model_status(&state).await))
}

/// PATCH /model/config
pub async fn reconfigure_model(
    State(state): State<AppState>,
    Json(patch): Json<ModelConfigPatch>,
) -> Result<Json<ModelStatusResponse>, ApiError> {
    state.chat.reconfigure(patch).await?;
    Ok(Json(model_status(&state).await))
}

/// DELETE /model
pub async fn dispose_model(State(state): State<AppState>) -> StatusCode {
    state.chat.dispose().await;
    StatusCode::NO_CONTENT
}

/// POST /chat/send
/// Send a message and wait for the full reply
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let attachments = decode_attachments(req.attachments)?;
    let outcome = state.chat.send(req.text, attachments, None).await?;
    Ok(Json(outcome.into()))
}

enum StreamState {
    Streaming(
        mpsc::UnboundedReceiver<PartialResponse>,
        JoinHandle<Result<SendOutcome, ChatError>>,
    ),
    Finished,
}

fn partial_event(partial: &PartialResponse) -> Result<Event, axum::Error> {
    Event::default().event("partial").json_data(partial)
}

fn error_event(message: String) -> Result<Event, axum::Error> {
    Ok(Event::default().event("error").data(message))
}

/// POST /chat/stream
/// Send a message and stream cumulative partial replies as server-sent
/// events. The final `partial` event has `done: true`; failures end the
/// stream with an `error` event.
pub async fn stream_message(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let attachments = decode_attachments(req.attachments)?;
    let (tx, rx) = mpsc::unbounded_channel();

    // The turn completes even if the client disconnects mid-stream
    let chat = Arc::clone(&state.chat);
    let task = tokio::spawn(async move { chat.send(req.text, attachments, Some(tx)).await });

    let events = stream::unfold(StreamState::Streaming(rx, task), |state| async move {
        match state {
            StreamState::Streaming(mut rx, task) => match rx.recv().await {
                Some(partial) => Some((partial_event(&partial), StreamState::Streaming(rx, task))),
                None => match task.await {
                    Ok(Ok(_)) => None,
                    Ok(Err(e)) => {
                        warn!("Streamed send failed: {}", e);
                        Some((error_event(e.to_string()), StreamState::Finished))
                    }
                    Err(e) => {
                        error!("Streamed send task failed: {}", e);
                        Some((error_event(e.to_string()), StreamState::Finished))
                    }
                },
            },
            StreamState::Finished => None,
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// GET /chat/history
pub async fn get_history(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.chat.history().await)
}

/// DELETE /chat/history
pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.chat.clear_history().await;
    StatusCode::NO_CONTENT
}

/// PUT /chat/context
/// Set the context window; the applied (clamped) value is returned
pub async fn set_context(
    State(state): State<AppState>,
    Json(req): Json<ContextRequest>,
) -> Json<ContextResponse> {
    let window = state.chat.set_context_window(req.window);
    Json(ContextResponse { window })
}

/// POST /audio/normalize
/// Convert an uploaded audio file to 16kHz mono float WAV
pub async fn normalize_audio(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let audio = state.normalizer.normalize_async(Arc::new(body.to_vec())).await?;
    let wav = audio.to_wav_bytes().map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode WAV: {}", e),
        )
    })?;

    info!(
        "Normalized {} bytes to {:.2}s of 16kHz mono audio",
        body.len(),
        audio.duration_seconds()
    );

    Ok(([(header::CONTENT_TYPE, "audio/wav")], wav))
}
