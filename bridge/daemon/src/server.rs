//! HTTP routes
//!
//! `POST /api/chat` streams one turn as server-sent events, one `data:` frame
//! per UI event followed by `data: [DONE]`. The turn is cancelled when the
//! client goes away and the response stream is dropped.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use bridge_core::EventSequencer;

use crate::api::{ApiError, ChatBody};

/// Header announcing the UI message stream protocol
const STREAM_PROTOCOL_HEADER: &str = "x-vercel-ai-ui-message-stream";

/// Shared state of all handlers
#[derive(Debug)]
pub struct AppState {
    /// Runs turns against the backend
    pub sequencer: EventSequencer,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/models", get(models))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `POST /api/chat`
async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let turn = body.into_turn()?;
    info!(
        messages = turn.messages.len(),
        model = ?turn.model,
        "Chat turn requested"
    );

    let cancel = CancellationToken::new();
    let events = state.sequencer.stream_turn(turn, cancel.clone()).await?;

    // Cancels the turn when the response body is dropped
    let guard = cancel.drop_guard();
    let frames = events
        .map(move |event| {
            let _ = &guard;
            Event::default().json_data(&event)
        })
        .chain(stream::once(async {
            debug!("Turn stream finished");
            Ok::<_, axum::Error>(Event::default().data("[DONE]"))
        }));

    Ok((
        [(STREAM_PROTOCOL_HEADER, "v1")],
        Sse::new(frames).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

/// `GET /api/models`
async fn models(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let models = state.sequencer.backend().list_models().await?;
    Ok(Json(json!({ "models": models })))
}

/// `GET /health`
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let backend = state.sequencer.backend();
    let reachable = backend.health_check().await;

    Json(json!({
        "status": if reachable { "ok" } else { "degraded" },
        "backend": backend.name(),
        "backendReachable": reachable,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    //! Route tests through `tower::ServiceExt::oneshot`.
    //!
    //! Tests cover:
    //! - SSE framing, the protocol header and the `[DONE]` terminator
    //! - Both accepted message shapes
    //! - 400 and 502 error responses
    //! - Model listing and health

    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use bridge_core::backend::{BackendError, ChatRequest, LlmBackend, ModelInfo};
    use bridge_core::streaming::{ChunkDecoder, ChunkStream};
    use bridge_core::tools::ToolRegistry;
    use bridge_core::{SamplingTable, SequencerConfig};

    /// Backend answering every request the same way
    enum Script {
        Lines(&'static [&'static str]),
        Unreachable,
    }

    #[async_trait]
    impl LlmBackend for Script {
        fn name(&self) -> &str {
            "Scripted"
        }

        async fn health_check(&self) -> bool {
            matches!(self, Self::Lines(_))
        }

        async fn stream_chat(&self, _request: &ChatRequest) -> Result<ChunkStream, BackendError> {
            match self {
                Self::Lines(lines) => {
                    let reads: Vec<Result<Bytes, std::io::Error>> = lines
                        .iter()
                        .map(|line| Ok(Bytes::from(format!("{line}\n"))))
                        .collect();
                    Ok(ChunkDecoder::new(stream::iter(reads)).into_stream())
                }
                Self::Unreachable => Err(BackendError::EmptyBody),
            }
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
            Ok(vec![ModelInfo {
                name: "llama3.2:latest".to_string(),
                size: None,
                parameters: Some("3.2B".to_string()),
                family: Some("llama".to_string()),
            }])
        }
    }

    const HELLO: &[&str] = &[
        r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
        r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#,
        r#"{"message":{"role":"assistant","content":""},"done":true}"#,
    ];

    fn app(script: Script) -> Router {
        let sequencer = EventSequencer::new(
            Arc::new(script),
            ToolRegistry::new(),
            SamplingTable::builtin(),
            SequencerConfig::default(),
        );
        router(Arc::new(AppState { sequencer }))
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    /// Payloads of the `data:` frames in an SSE body
    fn data_frames(body: &str) -> Vec<String> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(str::to_string)
            .collect()
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// A text turn streams one JSON frame per event and ends with `[DONE]`.
    #[tokio::test]
    async fn test_chat_streams_events() {
        let response = app(Script::Lines(HELLO))
            .oneshot(post_chat(r#"{"messages":[{"role":"user","content":"Say hello"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[STREAM_PROTOCOL_HEADER], "v1");
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let frames = data_frames(&body_text(response).await);
        assert_eq!(frames.last().map(String::as_str), Some("[DONE]"));

        let events: Vec<Value> = frames[..frames.len() - 1]
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect();
        let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec![
                "start",
                "start-step",
                "text-start",
                "text-delta",
                "text-delta",
                "text-end",
                "finish-step",
                "finish",
            ]
        );
        assert!(events[0]["messageId"].as_str().unwrap().starts_with("msg_"));
        assert_eq!(events[3]["delta"], "Hel");
        assert_eq!(events[7]["finishReason"], "stop");
    }

    /// UI messages with parts are accepted.
    #[tokio::test]
    async fn test_chat_accepts_ui_parts() {
        let response = app(Script::Lines(HELLO))
            .oneshot(post_chat(
                r#"{"messages":[{"role":"user","parts":[{"type":"text","text":"Hi"}]}],"think":false}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let frames = data_frames(&body_text(response).await);
        assert!(frames.len() > 1);
    }

    /// A request without messages is rejected before the backend is called.
    #[tokio::test]
    async fn test_chat_empty_messages() {
        let response = app(Script::Lines(HELLO))
            .oneshot(post_chat(r#"{"messages":[]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    /// A body that is not JSON is a bad request with a JSON error body.
    #[tokio::test]
    async fn test_chat_malformed_body() {
        let response = app(Script::Lines(HELLO))
            .oneshot(post_chat("{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    /// Clients cannot send `tool` messages.
    #[tokio::test]
    async fn test_chat_rejects_tool_role() {
        let response = app(Script::Lines(HELLO))
            .oneshot(post_chat(r#"{"messages":[{"role":"tool","content":"2"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Failing to reach the backend is a 502 carrying the backend's text.
    #[tokio::test]
    async fn test_chat_backend_failure() {
        let response = app(Script::Unreachable)
            .oneshot(post_chat(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(response).await["error"],
            "backend returned an empty response body"
        );
    }

    // =========================================================================
    // Models and health
    // =========================================================================

    #[tokio::test]
    async fn test_models() {
        let response = app(Script::Lines(HELLO))
            .oneshot(get("/api/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["models"][0]["name"], "llama3.2:latest");
        assert_eq!(body["models"][0]["family"], "llama");
    }

    #[tokio::test]
    async fn test_health() {
        let ok = body_json(app(Script::Lines(HELLO)).oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(ok["status"], "ok");
        assert_eq!(ok["backend"], "Scripted");
        assert_eq!(ok["backendReachable"], true);

        let degraded =
            body_json(app(Script::Unreachable).oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(degraded["status"], "degraded");
        assert_eq!(degraded["backendReachable"], false);
    }
}
