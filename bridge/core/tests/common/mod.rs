//! Shared fixtures for the bridge-core integration tests.
//!
//! [`ScriptedBackend`] replays canned NDJSON bodies through the real
//! [`ChunkDecoder`], cut into small reads so line reassembly is exercised on
//! every test, and records every request it receives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use reqwest::StatusCode;

use bridge_core::backend::{BackendError, ChatRequest, LlmBackend, ModelInfo};
use bridge_core::streaming::{ChunkDecoder, ChunkStream};
use bridge_core::UiEvent;

/// Read size used when replaying bodies
const READ_SIZE: usize = 7;

/// One scripted answer to `stream_chat`
#[derive(Clone, Debug)]
pub enum Reply {
    /// Stream these NDJSON lines, then close
    Lines(Vec<String>),
    /// Stream these lines, then never close
    Hang(Vec<String>),
    /// Fail the request with a status error
    Status(u16, String),
}

impl Reply {
    /// Lines from string slices
    pub fn lines(lines: &[&str]) -> Self {
        Self::Lines(lines.iter().map(|l| (*l).to_string()).collect())
    }
}

/// Backend that answers from a script
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    /// Backend answering with `replies` in order
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

fn body_reads(lines: &[String]) -> Vec<Result<Bytes, std::io::Error>> {
    let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
    body.as_bytes()
        .chunks(READ_SIZE)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect()
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError> {
        self.requests.lock().push(request.clone());
        let reply = self.replies.lock().pop_front();

        match reply {
            Some(Reply::Lines(lines)) => {
                Ok(ChunkDecoder::new(stream::iter(body_reads(&lines))).into_stream())
            }
            Some(Reply::Hang(lines)) => {
                let upstream = stream::iter(body_reads(&lines)).chain(stream::pending());
                Ok(ChunkDecoder::new(upstream).into_stream())
            }
            Some(Reply::Status(status, body)) => Err(BackendError::Status {
                status: StatusCode::from_u16(status).unwrap(),
                body,
            }),
            None => Err(BackendError::EmptyBody),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// NDJSON line builders
// =============================================================================

/// `{"message":{"role":"assistant","content":<text>},"done":false}`
pub fn content(text: &str) -> String {
    serde_json::json!({
        "message": {"role": "assistant", "content": text},
        "done": false
    })
    .to_string()
}

/// `{"message":{"role":"assistant","content":"","thinking":<text>},"done":false}`
pub fn thinking(text: &str) -> String {
    serde_json::json!({
        "message": {"role": "assistant", "content": "", "thinking": text},
        "done": false
    })
    .to_string()
}

/// A record carrying tool calls
pub fn tool_calls(calls: &[(&str, serde_json::Value)]) -> String {
    let calls: Vec<_> = calls
        .iter()
        .map(|(name, args)| serde_json::json!({"function": {"name": name, "arguments": args}}))
        .collect();
    serde_json::json!({
        "message": {"role": "assistant", "content": "", "tool_calls": calls},
        "done": false
    })
    .to_string()
}

/// The final record
pub fn done() -> String {
    r#"{"model":"test","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#
        .to_string()
}

// =============================================================================
// Event helpers
// =============================================================================

/// Protocol `type` of each event
pub fn kinds(events: &[UiEvent]) -> Vec<&'static str> {
    events.iter().map(UiEvent::kind).collect()
}

/// Concatenated text deltas
pub fn text_of(events: &[UiEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}
