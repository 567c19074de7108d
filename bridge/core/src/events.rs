//! UI Protocol Events
//!
//! Events sent from the bridge to the browser. Each serializes to a JSON
//! object with a `type` discriminator and camelCase fields, one object per
//! server-sent-event frame.
//!
//! # Ordering
//!
//! Per assistant message:
//!
//! ```text
//! start
//!   start-step
//!     reasoning-start → reasoning-delta* → reasoning-end     (optional)
//!     text-start → text-delta* → text-end                    (optional)
//!     tool-input-start → tool-input-available                (per tool call)
//!     tool-output-available | tool-output-error              (per tool call, call order)
//!   finish-step
//!   ... more steps ...
//! finish | error
//! ```
//!
//! Reasoning may interleave with text while streaming; a consumer that wants
//! reasoning rendered first reorders by part type alone (see
//! [`ChatMessage::display_parts`](crate::messages::ChatMessage::display_parts)).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::{MessageId, SegmentId, ToolCallId};

/// Events from the bridge to the UI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    /// A new assistant message begins
    #[serde(rename_all = "camelCase")]
    Start {
        /// Identifier of the assistant message
        message_id: MessageId,
    },

    /// A generation pass begins
    StartStep,

    /// A text segment opens
    TextStart {
        /// Segment identifier, stable across deltas
        id: SegmentId,
    },

    /// Text appended to an open segment
    TextDelta {
        /// Segment identifier
        id: SegmentId,
        /// Text to append
        delta: String,
    },

    /// A text segment closes
    TextEnd {
        /// Segment identifier
        id: SegmentId,
    },

    /// A reasoning segment opens
    ReasoningStart {
        /// Segment identifier, stable across deltas
        id: SegmentId,
    },

    /// Reasoning appended to an open segment
    ReasoningDelta {
        /// Segment identifier
        id: SegmentId,
        /// Text to append
        delta: String,
    },

    /// A reasoning segment closes
    ReasoningEnd {
        /// Segment identifier
        id: SegmentId,
    },

    /// A source reference attached to the message
    #[serde(rename_all = "camelCase")]
    SourceUrl {
        /// Source identifier
        source_id: String,
        /// The referenced URL
        url: String,
    },

    /// The model chose a tool; arguments are being produced
    #[serde(rename_all = "camelCase")]
    ToolInputStart {
        /// Tool call identifier
        tool_call_id: ToolCallId,
        /// Tool name
        tool_name: String,
    },

    /// Tool arguments are complete and execution is dispatched
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        /// Tool call identifier
        tool_call_id: ToolCallId,
        /// Tool name
        tool_name: String,
        /// Arguments as produced by the model
        input: Value,
    },

    /// Tool execution returned a value
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        /// Tool call identifier
        tool_call_id: ToolCallId,
        /// Tool result
        output: Value,
    },

    /// Tool execution or argument validation failed
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        /// Tool call identifier
        tool_call_id: ToolCallId,
        /// Failure description
        error_text: String,
    },

    /// A generation pass ended
    FinishStep,

    /// The stream failed; content emitted so far stays valid
    #[serde(rename_all = "camelCase")]
    Error {
        /// Failure description
        error_text: String,
    },

    /// The assistant message is complete
    #[serde(rename_all = "camelCase")]
    Finish {
        /// Why the turn ended
        finish_reason: FinishReason,
    },
}

impl UiEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }

    /// The protocol `type` string of this event
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::StartStep => "start-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ReasoningStart { .. } => "reasoning-start",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ReasoningEnd { .. } => "reasoning-end",
            Self::SourceUrl { .. } => "source-url",
            Self::ToolInputStart { .. } => "tool-input-start",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::ToolOutputError { .. } => "tool-output-error",
            Self::FinishStep => "finish-step",
            Self::Error { .. } => "error",
            Self::Finish { .. } => "finish",
        }
    }
}

/// Why a turn ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The backend sent its `done` record
    Stop,
    /// The backend closed the stream without a `done` record
    Truncated,
    /// The step bound was reached while the model still wanted tools
    StepLimit,
}
