//! HTTP API server for the chat UI
//!
//! This module provides a REST API over a `ChatSession`:
//! - GET /health - Health check
//! - GET /model, POST /model/load, PATCH /model/config, DELETE /model - Model lifecycle
//! - POST /chat/send - Send a message, buffered reply
//! - POST /chat/stream - Send a message, reply streamed as server-sent events
//! - GET /chat/history, DELETE /chat/history - Conversation history
//! - PUT /chat/context - Context window size
//! - POST /audio/normalize - Convert audio to 16kHz mono WAV

mod handlers;
mod routes;
mod state;

pub use handlers::{ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
