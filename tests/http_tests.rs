// Integration tests for the HTTP API
//
// These tests drive the router directly with tower's oneshot, backed by a
// chat session over the in-memory engine.

mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use common::{wav_bytes, FakeEngine};
use loqa_chat::chat::{ChatConfig, ChatSession};
use loqa_chat::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let session = ChatSession::new(FakeEngine::new(), ChatConfig::default());
    create_router(AppState::new(Arc::new(session)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Vec<u8>)> {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body)?).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, bytes.to_vec()))
}

async fn call_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let (status, bytes) = call(app, method, uri, body).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (status, body) = call(&app(), "GET", "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    Ok(())
}

#[tokio::test]
async fn test_send_without_model_is_unavailable() -> Result<()> {
    let (status, body) = call_json(&app(), "POST", "/chat/send", Some(json!({"text": "hi"}))).await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("not loaded"));

    Ok(())
}

#[tokio::test]
async fn test_model_lifecycle() -> Result<()> {
    let app = app();

    let (status, body) = call_json(&app, "POST", "/model/load", Some(json!({"preset": "gemma3-1b"}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["config"]["name"], "Gemma3-1B-IT");

    let (status, body) =
        call_json(&app, "PATCH", "/model/config", Some(json!({"temperature": 0.5}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["temperature"], 0.5);

    let (status, _) = call(&app, "DELETE", "/model", None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call_json(&app, "GET", "/model", None).await?;
    assert_eq!(body["ready"], false);
    assert!(body["config"].is_null());

    let (status, _) = call_json(&app, "PATCH", "/model/config", Some(json!({"top_k": 8}))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn test_load_model_request_validation() -> Result<()> {
    let app = app();

    let (status, _) = call_json(&app, "POST", "/model/load", Some(json!({"preset": "gpt-9"}))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call_json(&app, "POST", "/model/load", Some(json!({}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let config = json!({"config": {"name": "Local", "path": "/models/local.task"}});
    let (status, body) = call_json(&app, "POST", "/model/load", Some(config)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["max_tokens"], 1000);

    Ok(())
}

#[tokio::test]
async fn test_send_and_history() -> Result<()> {
    let app = app();
    call_json(&app, "POST", "/model/load", Some(json!({"preset": "gemma3-e2b"}))).await?;

    let (status, body) = call_json(&app, "POST", "/chat/send", Some(json!({"text": "hello"}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "you said hello");
    assert_eq!(body["assistant"]["role"], "assistant");

    let (_, history) = call_json(&app, "GET", "/chat/history", None).await?;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["type"], "text");

    let (status, _) = call(&app, "DELETE", "/chat/history", None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, history) = call_json(&app, "GET", "/chat/history", None).await?;
    assert_eq!(history, json!([]));

    Ok(())
}

#[tokio::test]
async fn test_send_with_attachments() -> Result<()> {
    let app = app();
    call_json(&app, "POST", "/model/load", Some(json!({"preset": "gemma3-e4b"}))).await?;

    let audio = base64::engine::general_purpose::STANDARD.encode(wav_bytes(&[vec![0.1; 1600]], 16000));
    let request = json!({
        "text": "transcribe",
        "attachments": [{"name": "memo.wav", "mime_type": "audio/wav", "data": audio}]
    });
    let (status, body) = call_json(&app, "POST", "/chat/send", Some(request)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["type"], "audio");
    assert_eq!(body["user"]["attachments"][0]["name"], "memo.wav");

    let request = json!({
        "text": "look",
        "attachments": [{"name": "x.png", "mime_type": "image/png", "data": "!!not base64!!"}]
    });
    let (status, _) = call_json(&app, "POST", "/chat/send", Some(request)).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}

#[tokio::test]
async fn test_stream_emits_cumulative_partials() -> Result<()> {
    let app = app();
    call_json(&app, "POST", "/model/load", Some(json!({"preset": "gemma2-2b"}))).await?;

    let (status, body) = call(&app, "POST", "/chat/stream", Some(json!({"text": "stream please"}))).await?;
    let body = String::from_utf8(body)?;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: partial"));
    assert!(body.contains(r#"{"text":"you","done":false}"#));
    assert!(body.contains(r#"{"text":"you said stream please","done":true}"#));

    let (_, history) = call_json(&app, "GET", "/chat/history", None).await?;
    assert_eq!(history.as_array().unwrap().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_stream_reports_errors_as_events() -> Result<()> {
    let (status, body) = call(&app(), "POST", "/chat/stream", Some(json!({"text": "hi"}))).await?;
    let body = String::from_utf8(body)?;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: error"));

    Ok(())
}

#[tokio::test]
async fn test_context_window_is_clamped() -> Result<()> {
    let (status, body) = call_json(&app(), "PUT", "/chat/context", Some(json!({"window": 99}))).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["window"], 50);

    Ok(())
}

#[tokio::test]
async fn test_normalize_endpoint() -> Result<()> {
    let app = app();

    let request = Request::builder()
        .method("POST")
        .uri("/audio/normalize")
        .body(Body::from(wav_bytes(&[vec![0.5; 4410], vec![0.5; 4410]], 44100)))?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes.to_vec()))?;
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len(), 1600);

    let request = Request::builder()
        .method("POST")
        .uri("/audio/normalize")
        .body(Body::from(vec![0u8; 64]))?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}
