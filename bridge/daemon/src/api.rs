//! Request and error types of the HTTP API.
//!
//! The chat endpoint accepts either plain `{role, content}` messages or the
//! UI's own message shape `{role, parts: [...]}`; both are reduced to role and
//! text before they reach the sequencer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use bridge_core::{BackendError, MessageRole, OutboundMessage, TurnRequest};

/// Body of `POST /api/chat`
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    /// Conversation history, oldest first
    pub messages: Vec<IncomingMessage>,
    /// Model id; the configured default when absent
    #[serde(default)]
    pub model: Option<String>,
    /// Think mode
    #[serde(default)]
    pub think: Option<bool>,
}

/// One history entry as sent by a client
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    /// Who sent it; clients cannot inject `tool` messages
    pub role: MessageRole,
    /// Plain text form
    #[serde(default)]
    pub content: Option<String>,
    /// UI message form
    #[serde(default)]
    pub parts: Vec<IncomingPart>,
}

/// A part of a UI message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IncomingPart {
    /// Text
    Text {
        /// The text
        text: String,
    },
    /// Reasoning, tool calls, sources; not sent back to the model
    #[serde(other)]
    Other,
}

impl IncomingMessage {
    /// Plain content when present, else the text parts joined
    fn text(&self) -> String {
        match &self.content {
            Some(content) if !content.is_empty() => content.clone(),
            _ => self
                .parts
                .iter()
                .filter_map(|part| match part {
                    IncomingPart::Text { text } => Some(text.as_str()),
                    IncomingPart::Other => None,
                })
                .collect(),
        }
    }
}

impl ChatBody {
    /// Reduce the body to a turn
    ///
    /// Messages without any text are dropped.
    pub fn into_turn(self) -> Result<TurnRequest, ApiError> {
        let messages: Vec<OutboundMessage> = self
            .messages
            .iter()
            .filter_map(|m| {
                let text = m.text();
                (!text.is_empty()).then(|| OutboundMessage::new(m.role.into(), text))
            })
            .collect();

        if messages.is_empty() {
            return Err(ApiError::BadRequest(
                "messages must contain at least one message with text".to_string(),
            ));
        }

        let mut turn = TurnRequest::new(messages);
        if let Some(model) = self.model.filter(|m| !m.trim().is_empty()) {
            turn = turn.with_model(model);
        }
        if let Some(think) = self.think {
            turn = turn.with_think(think);
        }
        Ok(turn)
    }
}

/// Errors returned before a response stream starts
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was malformed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The backend could not be reached or refused the request
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(m) => {
                warn!(reason = %m, "Rejected request");
                (StatusCode::BAD_REQUEST, m.clone())
            }
            Self::Backend(e) => {
                error!(error = %e, "Backend request failed");
                (StatusCode::BAD_GATEWAY, e.user_message())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::OutboundRole;
    use serde_json::json;

    fn body(value: serde_json::Value) -> ChatBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_plain_messages() {
        let turn = body(json!({
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hello"}
            ],
            "model": "qwen3:8b",
            "think": true
        }))
        .into_turn()
        .unwrap();

        assert_eq!(turn.messages.len(), 2);
        assert_eq!(turn.messages[0].role, OutboundRole::System);
        assert_eq!(turn.messages[1].content, "Hello");
        assert_eq!(turn.model.as_deref(), Some("qwen3:8b"));
        assert_eq!(turn.think, Some(true));
    }

    #[test]
    fn test_ui_parts_reduced_to_text() {
        let turn = body(json!({
            "messages": [
                {"role": "user", "parts": [{"type": "text", "text": "Weather in Oslo?"}]},
                {"role": "assistant", "parts": [
                    {"type": "reasoning", "text": "hidden"},
                    {"type": "tool-weather", "toolCallId": "call_1", "state": "output-available"},
                    {"type": "text", "text": "It is "},
                    {"type": "text", "text": "cold."}
                ]}
            ]
        }))
        .into_turn()
        .unwrap();

        assert_eq!(turn.messages.len(), 2);
        assert_eq!(turn.messages[0].content, "Weather in Oslo?");
        assert_eq!(turn.messages[1].content, "It is cold.");
        assert_eq!(turn.model, None);
    }

    #[test]
    fn test_tool_role_rejected() {
        let result = serde_json::from_value::<ChatBody>(json!({
            "messages": [{"role": "tool", "content": "{\"result\":2}"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = body(json!({"messages": []})).into_turn().unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = body(json!({"messages": [{"role": "user", "content": ""}]}))
            .into_turn()
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_blank_model_uses_default() {
        let turn = body(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "model": "  "
        }))
        .into_turn()
        .unwrap();
        assert_eq!(turn.model, None);
    }

    #[test]
    fn test_error_status_codes() {
        let bad = ApiError::BadRequest("nope".to_string()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let backend = ApiError::from(BackendError::EmptyBody).into_response();
        assert_eq!(backend.status(), StatusCode::BAD_GATEWAY);
    }
}
