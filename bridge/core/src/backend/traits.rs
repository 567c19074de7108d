//! LLM Backend Traits
//!
//! The request types sent to the backend and the trait every backend
//! implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::BackendError;
use crate::config::SamplingOptions;
use crate::streaming::{ChunkStream, ToolCallRequest};
use crate::tools::ToolDefinition;

/// Role of an outbound message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundRole {
    /// System prompt
    System,
    /// User turn
    User,
    /// Assistant turn
    Assistant,
    /// Tool result
    Tool,
}

/// A message in the backend request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Who sent it
    pub role: OutboundRole,
    /// Text content
    pub content: String,
    /// Tool calls made by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Tool that produced a `tool` message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl OutboundMessage {
    /// Create a plain text message
    pub fn new(role: OutboundRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    /// Assistant turn that requested tool calls
    #[must_use]
    pub fn assistant_tool_calls(content: String, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: OutboundRole::Assistant,
            content,
            tool_calls,
            tool_name: None,
        }
    }

    /// Result of one tool call
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: OutboundRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: Some(tool_name.into()),
        }
    }
}

/// A streaming chat request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation context
    pub messages: Vec<OutboundMessage>,
    /// Always true for the bridge
    pub stream: bool,
    /// Think mode; omitted when unset so models without it still answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<bool>,
    /// Sampling parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SamplingOptions>,
    /// Tools the model may call
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    /// Create a streaming request
    pub fn new(model: impl Into<String>, messages: Vec<OutboundMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            think: None,
            options: None,
            tools: Vec::new(),
        }
    }

    /// Set think mode
    #[must_use]
    pub fn with_think(mut self, think: Option<bool>) -> Self {
        self.think = think;
        self
    }

    /// Set sampling options
    #[must_use]
    pub fn with_options(mut self, options: SamplingOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set tool declarations
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Information about an available model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier
    pub name: String,
    /// Model size in bytes (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Parameter count (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    /// Model family (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// LLM Backend trait
///
/// Implement this trait to put a different server behind the bridge.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Get the backend name (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Check if the backend is healthy and reachable
    async fn health_check(&self) -> bool;

    /// Send a chat request and get the decoded chunk stream
    ///
    /// Errors here happen before any chunk exists: connection failures,
    /// non-success status, empty body.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;
}
