//! Tool invocation lifecycle
//!
//! ```text
//! input-streaming ──► input-available ──┬──► output-available
//!                                       └──► output-error
//! ```
//!
//! Transitions are strictly forward. The two output states are terminal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events::UiEvent;
use crate::messages::ToolCallId;

/// State of a tool invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    /// Arguments are being produced
    InputStreaming,
    /// Arguments complete; execution dispatched
    InputAvailable,
    /// Execution returned a value
    OutputAvailable,
    /// Execution or validation failed
    OutputError,
}

impl ToolState {
    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OutputAvailable | Self::OutputError)
    }

    /// Whether `next` directly follows this state
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::InputStreaming, Self::InputAvailable)
                | (Self::InputAvailable, Self::OutputAvailable | Self::OutputError)
        )
    }

    /// Whether a tool card in this state is shown expanded by default
    #[must_use]
    pub fn auto_expands(self) -> bool {
        self.is_terminal()
    }
}

/// Attempted an out-of-order tool state change
#[derive(Debug, Error, PartialEq, Eq)]
#[error("tool call {tool_call_id}: cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
    /// Tool call identifier
    pub tool_call_id: String,
    /// State before the attempt
    pub from: ToolState,
    /// Requested state
    pub to: ToolState,
}

/// One tool call as tracked by the sequencer
///
/// Every transition returns the protocol event announcing it, so the state
/// and the emitted events cannot drift apart.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    id: ToolCallId,
    tool_name: String,
    state: ToolState,
}

impl ToolInvocation {
    /// Begin tracking a call with a fresh identifier
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self::with_id(ToolCallId::new(), tool_name)
    }

    /// Begin tracking a call with a given identifier
    pub fn with_id(id: ToolCallId, tool_name: impl Into<String>) -> Self {
        Self {
            id,
            tool_name: tool_name.into(),
            state: ToolState::InputStreaming,
        }
    }

    /// Tool call identifier
    #[must_use]
    pub fn id(&self) -> &ToolCallId {
        &self.id
    }

    /// Tool name
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ToolState {
        self.state
    }

    /// The `tool-input-start` event for this call
    #[must_use]
    pub fn start_event(&self) -> UiEvent {
        UiEvent::ToolInputStart {
            tool_call_id: self.id.clone(),
            tool_name: self.tool_name.clone(),
        }
    }

    /// Arguments are complete
    pub fn input_available(&mut self, input: Value) -> Result<UiEvent, TransitionError> {
        self.advance(ToolState::InputAvailable)?;
        Ok(UiEvent::ToolInputAvailable {
            tool_call_id: self.id.clone(),
            tool_name: self.tool_name.clone(),
            input,
        })
    }

    /// Execution returned a value
    pub fn complete(&mut self, output: Value) -> Result<UiEvent, TransitionError> {
        self.advance(ToolState::OutputAvailable)?;
        Ok(UiEvent::ToolOutputAvailable {
            tool_call_id: self.id.clone(),
            output,
        })
    }

    /// Execution failed
    pub fn fail(&mut self, error_text: impl Into<String>) -> Result<UiEvent, TransitionError> {
        self.advance(ToolState::OutputError)?;
        Ok(UiEvent::ToolOutputError {
            tool_call_id: self.id.clone(),
            error_text: error_text.into(),
        })
    }

    fn advance(&mut self, next: ToolState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                tool_call_id: self.id.0.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forward_transitions() {
        let mut call = ToolInvocation::with_id(ToolCallId("call_1".into()), "weather");
        assert_eq!(call.state(), ToolState::InputStreaming);

        let event = call.input_available(json!({"location": "Oslo"})).unwrap();
        assert_eq!(event.kind(), "tool-input-available");

        let event = call.complete(json!({"temperature": 3})).unwrap();
        assert_eq!(event.kind(), "tool-output-available");
        assert!(call.state().is_terminal());
    }

    #[test]
    fn test_cannot_skip_input_available() {
        let mut call = ToolInvocation::new("calculator");
        let err = call.fail("boom").unwrap_err();
        assert_eq!(err.from, ToolState::InputStreaming);
        assert_eq!(err.to, ToolState::OutputError);
        assert_eq!(call.state(), ToolState::InputStreaming);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut call = ToolInvocation::new("calculator");
        call.input_available(json!({})).unwrap();
        call.fail("bad").unwrap();
        assert!(call.complete(json!(1)).is_err());
        assert!(call.input_available(json!({})).is_err());
    }

    #[test]
    fn test_auto_expand_only_when_finished() {
        assert!(!ToolState::InputStreaming.auto_expands());
        assert!(!ToolState::InputAvailable.auto_expands());
        assert!(ToolState::OutputAvailable.auto_expands());
        assert!(ToolState::OutputError.auto_expands());
    }

    #[test]
    fn test_state_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(ToolState::OutputAvailable).unwrap(),
            json!("output-available")
        );
    }
}
