//! Stream chunk types and the per-line classifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Longest slice of an unparseable line that ends up in a log record
const LOG_PREVIEW_CHARS: usize = 120;

/// A single decoded unit of the backend stream
///
/// Produced at the system boundary by [`decode_line`]; no untyped JSON
/// record crosses into the sequencer.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamChunk {
    /// A piece of assistant text
    ContentDelta {
        /// Role reported by the backend (normally `assistant`)
        role: String,
        /// The text fragment
        content: String,
    },
    /// A piece of reasoning ("thinking") text
    ReasoningDelta(String),
    /// The model asked for one or more tool calls
    ToolCalls(Vec<ToolCallRequest>),
    /// The stream completed
    Done {
        /// True when the upstream closed without ever sending `done: true`
        truncated: bool,
    },
    /// The backend reported an error, or the transport failed mid-stream
    Error(String),
    /// A line that was not a valid record; carries the raw line
    Unparseable(String),
}

impl StreamChunk {
    /// Whether nothing can follow this chunk
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error(_))
    }
}

/// A tool call as it appears on the Ollama wire
///
/// The same shape is used inbound (`message.tool_calls`) and outbound when
/// the assistant turn is replayed into the context of the next step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The function being called
    pub function: ToolCallFunction,
}

/// Function name and arguments of a [`ToolCallRequest`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Tool name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Create a tool call request
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: ToolCallFunction {
                name: name.into(),
                arguments,
            },
        }
    }

    /// Tool name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Arguments object
    #[must_use]
    pub fn arguments(&self) -> &Value {
        &self.function.arguments
    }
}

// ============================================================================
// Wire records
// ============================================================================

#[derive(Debug, Deserialize)]
struct BackendRecord {
    #[serde(default)]
    message: Option<RecordMessage>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RecordMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

/// Classify one complete, trimmed, non-empty line
///
/// A single record may yield several chunks (thinking, content, tool calls
/// and `done` can share a line); they are returned in that order. An
/// `error` field short-circuits everything else on the line.
#[must_use]
pub fn decode_line(line: &str) -> Vec<StreamChunk> {
    let record: BackendRecord = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(e) => {
            warn!(
                error = %e,
                line = %preview(line),
                "Skipping unparseable stream line"
            );
            return vec![StreamChunk::Unparseable(line.to_string())];
        }
    };

    if let Some(error) = record.error.filter(|e| !is_blank(e)) {
        let message = match error {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return vec![StreamChunk::Error(message)];
    }

    let mut chunks = Vec::new();

    if let Some(message) = record.message {
        if let Some(thinking) = message.thinking.filter(|t| !t.is_empty()) {
            chunks.push(StreamChunk::ReasoningDelta(thinking));
        }
        if let Some(content) = message.content.filter(|c| !c.is_empty()) {
            chunks.push(StreamChunk::ContentDelta {
                role: message.role.unwrap_or_else(|| "assistant".to_string()),
                content,
            });
        }
        if let Some(calls) = message.tool_calls.filter(|c| !c.is_empty()) {
            chunks.push(StreamChunk::ToolCalls(
                calls.into_iter().map(normalize_arguments).collect(),
            ));
        }
    }

    if record.done == Some(true) {
        chunks.push(StreamChunk::Done { truncated: false });
    }

    chunks
}

/// `null`, `false` and `""` count as no error
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Some models emit the arguments object as a JSON-encoded string
fn normalize_arguments(mut call: ToolCallRequest) -> ToolCallRequest {
    if let Value::String(raw) = &call.function.arguments {
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            call.function.arguments = parsed;
        }
    }
    call
}

fn preview(line: &str) -> String {
    if line.chars().count() <= LOG_PREVIEW_CHARS {
        line.to_string()
    } else {
        let head: String = line.chars().take(LOG_PREVIEW_CHARS).collect();
        format!("{head}…")
    }
}
