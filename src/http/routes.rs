use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Largest accepted request body. Base64 inflates attachments by a third.
const MAX_BODY_BYTES: usize = 80 * 1024 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Model lifecycle
        .route(
            "/model",
            get(handlers::get_model).delete(handlers::dispose_model),
        )
        .route("/model/load", post(handlers::load_model))
        .route("/model/config", patch(handlers::reconfigure_model))
        // Conversation
        .route("/chat/send", post(handlers::send_message))
        .route("/chat/stream", post(handlers::stream_message))
        .route(
            "/chat/history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route("/chat/context", put(handlers::set_context))
        // Audio conversion
        .route("/audio/normalize", post(handlers::normalize_audio))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        // Request logging, and CORS for the browser UI
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
