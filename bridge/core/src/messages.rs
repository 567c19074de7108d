//! Chat Messages
//!
//! The message model a chat UI renders, and the reducer that folds
//! [`UiEvent`]s into it. The reducer is the pure-data half of the rendering
//! layer: it keeps the invariants the UI relies on (deltas append, segment
//! ids are stable, reasoning is displayed before text) without any UI code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::backend::{OutboundMessage, OutboundRole};
use crate::events::UiEvent;
use crate::tools::ToolState;

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a text or reasoning segment
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub String);

impl SegmentId {
    /// Generate a new text segment ID
    #[must_use]
    pub fn text() -> Self {
        Self(format!("txt_{}", Uuid::new_v4().simple()))
    }

    /// Generate a new reasoning segment ID
    #[must_use]
    pub fn reasoning() -> Self {
        Self(format!("rsn_{}", Uuid::new_v4().simple()))
    }
}

/// Tool call identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallId(pub String);

impl ToolCallId {
    /// Generate a new unique tool call ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("call_{}", Uuid::new_v4().simple()))
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Model output
    Assistant,
    /// System prompt
    System,
}

impl From<MessageRole> for OutboundRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Self::User,
            MessageRole::Assistant => Self::Assistant,
            MessageRole::System => Self::System,
        }
    }
}

/// One piece of a message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// Answer text
    Text {
        /// Segment identifier
        id: SegmentId,
        /// Accumulated text
        content: String,
        /// Whether deltas are still arriving
        streaming: bool,
    },
    /// Reasoning trace
    Reasoning {
        /// Segment identifier
        id: SegmentId,
        /// Accumulated text
        content: String,
        /// Whether deltas are still arriving
        streaming: bool,
    },
    /// A referenced source
    #[serde(rename_all = "camelCase")]
    SourceUrl {
        /// Source identifier
        source_id: String,
        /// The URL
        url: String,
    },
    /// A tool invocation card
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Tool call identifier
        tool_call_id: ToolCallId,
        /// Tool name, e.g. `weather`
        tool_type: String,
        /// Lifecycle state
        state: ToolState,
        /// Arguments
        input: Value,
        /// Result, once available
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        /// Failure text, once failed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_text: Option<String>,
    },
}

impl MessagePart {
    fn is_reasoning(&self) -> bool {
        matches!(self, Self::Reasoning { .. })
    }

    fn close(&mut self) {
        if let Self::Text { streaming, .. } | Self::Reasoning { streaming, .. } = self {
            *streaming = false;
        }
    }
}

/// One turn in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Parts in arrival order
    pub parts: Vec<MessagePart>,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Set once `finish` or `error` arrived; later events are ignored
    #[serde(default)]
    pub finished: bool,
}

impl ChatMessage {
    /// Create a message holding a single complete text part
    pub fn from_text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            parts: vec![MessagePart::Text {
                id: SegmentId::text(),
                content: text.into(),
                streaming: false,
            }],
            created_at: Utc::now(),
            finished: true,
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::from_text(MessageRole::User, text)
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::from_text(MessageRole::System, text)
    }

    /// Create an empty assistant message opened by a `start` event
    #[must_use]
    pub fn assistant(id: MessageId) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            parts: Vec::new(),
            created_at: Utc::now(),
            finished: false,
        }
    }

    /// Concatenated content of all text parts
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Parts in display order: reasoning first, everything else after,
    /// each group keeping its arrival order
    #[must_use]
    pub fn display_parts(&self) -> Vec<&MessagePart> {
        let (reasoning, rest): (Vec<&MessagePart>, Vec<&MessagePart>) =
            self.parts.iter().partition(|part| part.is_reasoning());
        reasoning.into_iter().chain(rest).collect()
    }

    /// Whether any part is still receiving deltas
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.parts.iter().any(|part| {
            matches!(
                part,
                MessagePart::Text {
                    streaming: true,
                    ..
                } | MessagePart::Reasoning {
                    streaming: true,
                    ..
                }
            )
        })
    }

    /// Fold one event into this message
    ///
    /// `start` and step markers carry no part data and are ignored here;
    /// [`Conversation::apply_event`] handles message creation. After `finish`
    /// or `error` the message is frozen and every further event is dropped.
    pub fn apply(&mut self, event: &UiEvent) {
        if self.finished {
            warn!(
                message_id = %self.id.0,
                event = event.kind(),
                "Event after message finished ignored"
            );
            return;
        }

        match event {
            UiEvent::TextStart { id } => self.parts.push(MessagePart::Text {
                id: id.clone(),
                content: String::new(),
                streaming: true,
            }),
            UiEvent::ReasoningStart { id } => self.parts.push(MessagePart::Reasoning {
                id: id.clone(),
                content: String::new(),
                streaming: true,
            }),
            UiEvent::TextDelta { id, delta } | UiEvent::ReasoningDelta { id, delta } => {
                match self.segment_mut(id) {
                    Some(content) => content.push_str(delta),
                    None => warn!(segment = %id.0, "Delta for unknown segment ignored"),
                }
            }
            UiEvent::TextEnd { id } | UiEvent::ReasoningEnd { id } => {
                if let Some(part) = self.parts.iter_mut().find(|p| p.segment_id() == Some(id)) {
                    part.close();
                }
            }
            UiEvent::SourceUrl { source_id, url } => self.parts.push(MessagePart::SourceUrl {
                source_id: source_id.clone(),
                url: url.clone(),
            }),
            UiEvent::ToolInputStart {
                tool_call_id,
                tool_name,
            } => self.parts.push(MessagePart::ToolCall {
                tool_call_id: tool_call_id.clone(),
                tool_type: tool_name.clone(),
                state: ToolState::InputStreaming,
                input: Value::Null,
                output: None,
                error_text: None,
            }),
            UiEvent::ToolInputAvailable {
                tool_call_id,
                input: new_input,
                ..
            } => self.advance_tool(tool_call_id, ToolState::InputAvailable, |input, _, _| {
                *input = new_input.clone();
            }),
            UiEvent::ToolOutputAvailable {
                tool_call_id,
                output: new_output,
            } => self.advance_tool(tool_call_id, ToolState::OutputAvailable, |_, output, _| {
                *output = Some(new_output.clone());
            }),
            UiEvent::ToolOutputError {
                tool_call_id,
                error_text: text,
            } => self.advance_tool(tool_call_id, ToolState::OutputError, |_, _, error| {
                *error = Some(text.clone());
            }),
            UiEvent::Finish { .. } | UiEvent::Error { .. } => {
                for part in &mut self.parts {
                    part.close();
                }
                self.finished = true;
            }
            UiEvent::Start { .. } | UiEvent::StartStep | UiEvent::FinishStep => {}
        }
    }

    fn segment_mut(&mut self, id: &SegmentId) -> Option<&mut String> {
        self.parts.iter_mut().find_map(|part| match part {
            MessagePart::Text {
                id: part_id,
                content,
                ..
            }
            | MessagePart::Reasoning {
                id: part_id,
                content,
                ..
            } if part_id == id => Some(content),
            _ => None,
        })
    }

    fn advance_tool(
        &mut self,
        call_id: &ToolCallId,
        next: ToolState,
        update: impl FnOnce(&mut Value, &mut Option<Value>, &mut Option<String>),
    ) {
        let card = self.parts.iter_mut().find_map(|part| match part {
            MessagePart::ToolCall {
                tool_call_id,
                state,
                input,
                output,
                error_text,
                ..
            } if tool_call_id == call_id => Some((state, input, output, error_text)),
            _ => None,
        });

        let Some((state, input, output, error_text)) = card else {
            warn!(tool_call_id = %call_id.0, "Event for unknown tool call ignored");
            return;
        };

        if !state.can_transition_to(next) {
            warn!(
                tool_call_id = %call_id.0,
                from = ?state,
                to = ?next,
                "Illegal tool state transition ignored"
            );
            return;
        }

        *state = next;
        update(input, output, error_text);
    }
}

impl MessagePart {
    fn segment_id(&self) -> Option<&SegmentId> {
        match self {
            Self::Text { id, .. } | Self::Reasoning { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Ordered conversation history
///
/// Only the active turn writes to it. Nothing here is persisted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    /// Text of the last `error` event, if the latest turn failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation from existing messages
    #[must_use]
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            last_error: None,
        }
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Error text of the latest failed turn
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Append a user message
    pub fn push_user(&mut self, text: impl Into<String>) -> &ChatMessage {
        self.push(ChatMessage::user(text))
    }

    /// Append a system message
    pub fn push_system(&mut self, text: impl Into<String>) -> &ChatMessage {
        self.push(ChatMessage::system(text))
    }

    /// Append an arbitrary message
    pub fn push(&mut self, message: ChatMessage) -> &ChatMessage {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Open an empty assistant message for a new turn
    pub fn begin_assistant(&mut self, id: MessageId) -> &ChatMessage {
        self.last_error = None;
        self.push(ChatMessage::assistant(id))
    }

    /// Fold a streamed event into the conversation
    ///
    /// `start` opens a new assistant message; every other event is applied to
    /// the trailing assistant message. Events arriving with no assistant
    /// message open are ignored.
    pub fn apply_event(&mut self, event: &UiEvent) {
        match event {
            UiEvent::Start { message_id } => {
                self.begin_assistant(message_id.clone());
                return;
            }
            UiEvent::Error { error_text } => self.last_error = Some(error_text.clone()),
            _ => {}
        }

        match self.messages.last_mut() {
            Some(message) if message.role == MessageRole::Assistant => message.apply(event),
            _ => warn!(event = event.kind(), "Event without an open assistant message ignored"),
        }
    }

    /// Drop the trailing assistant message so the turn can be regenerated
    ///
    /// Returns the removed message, or `None` when the conversation does not
    /// end with an assistant message.
    pub fn regenerate(&mut self) -> Option<ChatMessage> {
        match self.messages.last() {
            Some(message) if message.role == MessageRole::Assistant => {
                self.last_error = None;
                self.messages.pop()
            }
            _ => None,
        }
    }

    /// Reduce the history to role + text pairs for the backend
    ///
    /// Messages without any text (for example a turn that only called tools)
    /// are skipped.
    #[must_use]
    pub fn to_outbound(&self) -> Vec<OutboundMessage> {
        self.messages
            .iter()
            .filter_map(|message| {
                let text = message.text();
                (!text.is_empty()).then(|| OutboundMessage::new(message.role.into(), text))
            })
            .collect()
    }
}
