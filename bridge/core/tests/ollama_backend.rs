//! Ollama client tests against a mock HTTP server

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bridge_core::backend::{
    BackendError, ChatRequest, LlmBackend, OllamaBackend, OutboundMessage, OutboundRole,
};
use bridge_core::{SamplingOptions, StreamChunk};

fn hello_request() -> ChatRequest {
    ChatRequest::new(
        "llama3.2",
        vec![OutboundMessage::new(OutboundRole::User, "Hello")],
    )
}

fn ndjson(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/x-ndjson")
        .set_body_string(body)
}

#[tokio::test]
async fn test_stream_chat_decodes_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.2",
            "stream": true,
            "options": {"temperature": 0.5, "top_p": 0.9, "top_k": 40}
        })))
        .respond_with(ndjson(concat!(
            r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":""},"done":true}"#,
            "\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(&format!("{}/", server.uri())).unwrap();
    let request = hello_request().with_options(SamplingOptions::new(0.5, 0.9, 40));

    let chunks: Vec<StreamChunk> = backend.stream_chat(&request).await.unwrap().collect().await;

    assert_eq!(
        chunks,
        vec![
            StreamChunk::ContentDelta {
                role: "assistant".to_string(),
                content: "Hel".to_string(),
            },
            StreamChunk::ContentDelta {
                role: "assistant".to_string(),
                content: "lo".to_string(),
            },
            StreamChunk::Done { truncated: false },
        ]
    );
}

#[tokio::test]
async fn test_stream_chat_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string(r#"{"error":"model 'llama3.2' not found"}"#),
        )
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(&server.uri()).unwrap();
    let Err(err) = backend.stream_chat(&hello_request()).await else {
        panic!("expected a status error");
    };

    match &err {
        BackendError::Status { status, .. } => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), "model 'llama3.2' not found");
}

#[tokio::test]
async fn test_stream_chat_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(&server.uri()).unwrap();
    let result = backend.stream_chat(&hello_request()).await;

    assert!(matches!(result, Err(BackendError::EmptyBody)));
}

#[tokio::test]
async fn test_stream_chat_connection_refused() {
    // Bind then drop to get a port with nothing listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let backend = OllamaBackend::new(&format!("http://127.0.0.1:{port}")).unwrap();

    let result = backend.stream_chat(&hello_request()).await;

    assert!(matches!(result, Err(BackendError::Request { .. })));
}

#[tokio::test]
async fn test_stream_without_done_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(
            r#"{"message":{"role":"assistant","content":"partial"},"done":false}"#,
        ))
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(&server.uri()).unwrap();
    let chunks: Vec<StreamChunk> = backend
        .stream_chat(&hello_request())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1], StreamChunk::Done { truncated: true });
}

#[tokio::test]
async fn test_list_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {
                    "name": "qwen3:8b",
                    "size": 5_200_000_000_u64,
                    "details": {"parameter_size": "8.2B", "family": "qwen3"}
                },
                {"name": "llama3.2:latest"}
            ]
        })))
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(&server.uri()).unwrap();
    let models = backend.list_models().await.unwrap();

    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "qwen3:8b");
    assert_eq!(models[0].parameters.as_deref(), Some("8.2B"));
    assert_eq!(models[0].family.as_deref(), Some("qwen3"));
    assert_eq!(models[1].size, None);
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let healthy = OllamaBackend::new(&server.uri()).unwrap();
    assert!(healthy.health_check().await);

    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let unreachable = OllamaBackend::new(&format!("http://127.0.0.1:{port}")).unwrap();
    assert!(!unreachable.health_check().await);
}
