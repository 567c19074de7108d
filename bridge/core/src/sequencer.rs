//! Event Sequencer
//!
//! Drives one chat turn: sends the request, translates each [`StreamChunk`]
//! into UI protocol events, and when the model asks for tools, executes them
//! and re-invokes the backend with the results.
//!
//! # Turn Flow
//!
//! ```text
//!            stream_turn()
//!                 │  first backend call (errors returned, no events yet)
//!                 ▼
//!   start ──► start-step ──► chunks ──► Done ──┬── no tool calls ──► finish-step ──► finish(stop|truncated)
//!                ▲                             │
//!                │                             └── tool calls ──► input-available* ──► join_all
//!                │                                                        │
//!                │                                      outputs in call order ──► finish-step
//!                │                                                        │
//!                └────────── step < max_steps: backend call ◄─────────────┤
//!                                                                         └── step == max_steps ──► finish(step-limit)
//! ```
//!
//! A backend `error` chunk, a read failure or a failed follow-up request
//! closes any open segment, fails any tool call still waiting for its input,
//! emits `error` and ends the stream. Cancellation
//! ends the stream silently.

use std::sync::Arc;

use async_stream::stream;
use futures::future::join_all;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, ChatRequest, LlmBackend, OutboundMessage, OutboundRole};
use crate::config::{ChatSettings, SamplingTable};
use crate::events::{FinishReason, UiEvent};
use crate::messages::{MessageId, SegmentId};
use crate::streaming::{ChunkStream, StreamChunk, ToolCallRequest};
use crate::tools::{ToolError, ToolInvocation, ToolRegistry};

/// Ordered UI events of one turn
pub type EventStream = BoxStream<'static, UiEvent>;

/// Turn defaults for the sequencer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Model used when the turn names none
    pub default_model: String,
    /// Maximum generation passes per turn
    pub max_steps: usize,
    /// Think mode used when the turn does not say
    pub default_think: Option<bool>,
    /// Prepended as a system message unless the history already starts with one
    pub system_prompt: Option<String>,
    /// Whether tool declarations are sent
    pub enable_tools: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self::from(&ChatSettings::default())
    }
}

impl From<&ChatSettings> for SequencerConfig {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            default_model: settings.default_model.clone(),
            max_steps: settings.max_steps.max(1),
            default_think: settings.default_think,
            system_prompt: settings.system_prompt.clone(),
            enable_tools: settings.enable_tools,
        }
    }
}

/// One user turn
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnRequest {
    /// History reduced to role + text, oldest first
    pub messages: Vec<OutboundMessage>,
    /// Model id; the configured default when `None`
    pub model: Option<String>,
    /// Think mode; the configured default when `None`
    pub think: Option<bool>,
}

impl TurnRequest {
    /// Create a turn over the given history
    #[must_use]
    pub fn new(messages: Vec<OutboundMessage>) -> Self {
        Self {
            messages,
            model: None,
            think: None,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set think mode
    #[must_use]
    pub fn with_think(mut self, think: bool) -> Self {
        self.think = Some(think);
        self
    }
}

/// Turns chunk streams into UI events and runs the tool loop
#[derive(Clone)]
pub struct EventSequencer {
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    sampling: Arc<SamplingTable>,
    config: SequencerConfig,
}

impl std::fmt::Debug for EventSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSequencer")
            .field("backend", &self.backend.name())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventSequencer {
    /// Create a sequencer
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        tools: ToolRegistry,
        sampling: SamplingTable,
        config: SequencerConfig,
    ) -> Self {
        Self {
            backend,
            tools: Arc::new(tools),
            sampling: Arc::new(sampling),
            config,
        }
    }

    /// Turn defaults
    #[must_use]
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// The backend this sequencer talks to
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    /// Start a turn
    ///
    /// The first backend request is made before returning, so connection
    /// failures, non-success statuses and empty bodies surface here as
    /// errors instead of as events.
    ///
    /// # Errors
    ///
    /// Returns the [`BackendError`] of the first request.
    pub async fn stream_turn(
        &self,
        turn: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, BackendError> {
        let model = turn
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        let think = turn.think.or(self.config.default_think);
        let context = self.initial_context(turn.messages);

        let first = self
            .backend
            .stream_chat(&self.build_request(&model, think, &context))
            .await?;

        Ok(self.run(model, think, context, first, cancel).boxed())
    }

    fn initial_context(&self, messages: Vec<OutboundMessage>) -> Vec<OutboundMessage> {
        let Some(prompt) = self.config.system_prompt.as_ref() else {
            return messages;
        };
        if messages.first().is_some_and(|m| m.role == OutboundRole::System) {
            return messages;
        }
        let mut context = Vec::with_capacity(messages.len() + 1);
        context.push(OutboundMessage::new(OutboundRole::System, prompt.clone()));
        context.extend(messages);
        context
    }

    fn build_request(
        &self,
        model: &str,
        think: Option<bool>,
        context: &[OutboundMessage],
    ) -> ChatRequest {
        let mut request = ChatRequest::new(model, context.to_vec())
            .with_think(think)
            .with_options(self.sampling.lookup(model).clone());
        if self.config.enable_tools {
            request = request.with_tools(self.tools.definitions());
        }
        request
    }

    fn run(
        &self,
        model: String,
        think: Option<bool>,
        mut context: Vec<OutboundMessage>,
        first: ChunkStream,
        cancel: CancellationToken,
    ) -> impl futures::Stream<Item = UiEvent> + Send + 'static {
        let this = self.clone();
        let max_steps = self.config.max_steps.max(1);

        stream! {
            let message_id = MessageId::new();
            debug!(message_id = %message_id.0, model = %model, "Turn started");
            yield UiEvent::Start { message_id: message_id.clone() };

            let mut pending_stream = Some(first);
            let mut step = 1;

            loop {
                let mut chunks = match pending_stream.take() {
                    Some(chunks) => chunks,
                    None => {
                        let request = this.build_request(&model, think, &context);
                        let result = tokio::select! {
                            biased;
                            () = cancel.cancelled() => None,
                            result = this.backend.stream_chat(&request) => Some(result),
                        };
                        match result {
                            None => {
                                debug!(step, "Turn cancelled before request");
                                return;
                            }
                            Some(Ok(chunks)) => chunks,
                            Some(Err(e)) => {
                                warn!(step, error = %e, "Follow-up request failed");
                                yield UiEvent::Error { error_text: e.user_message() };
                                return;
                            }
                        }
                    }
                };

                debug!(step, max_steps, "Step started");
                yield UiEvent::StartStep;

                let mut state = StepState::default();
                let truncated = loop {
                    let next = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        chunk = chunks.next() => Some(chunk),
                    };
                    let Some(chunk) = next else {
                        debug!(step, "Turn cancelled mid-stream");
                        return;
                    };

                    match chunk {
                        Some(StreamChunk::ReasoningDelta(delta)) => {
                            for event in state.reasoning(delta) {
                                yield event;
                            }
                        }
                        Some(StreamChunk::ContentDelta { content, .. }) => {
                            for event in state.text(content) {
                                yield event;
                            }
                        }
                        Some(StreamChunk::ToolCalls(calls)) => {
                            for event in state.tool_calls(calls) {
                                yield event;
                            }
                        }
                        Some(StreamChunk::Unparseable(_)) => {}
                        Some(StreamChunk::Done { truncated }) => break truncated,
                        Some(StreamChunk::Error(error_text)) => {
                            warn!(step, error = %error_text, "Backend reported an error");
                            for event in state.close() {
                                yield event;
                            }
                            for event in state.fail_calls(&error_text) {
                                yield event;
                            }
                            yield UiEvent::Error { error_text };
                            return;
                        }
                        None => break true,
                    }
                };
                drop(chunks);

                for event in state.close() {
                    yield event;
                }

                if state.calls.is_empty() {
                    yield UiEvent::FinishStep;
                    let finish_reason = if truncated {
                        FinishReason::Truncated
                    } else {
                        FinishReason::Stop
                    };
                    info!(message_id = %message_id.0, steps = step, ?finish_reason, "Turn finished");
                    yield UiEvent::Finish { finish_reason };
                    return;
                }

                let mut calls = std::mem::take(&mut state.calls);
                for (invocation, request) in &mut calls {
                    match invocation.input_available(request.arguments().clone()) {
                        Ok(event) => {
                            yield event;
                        }
                        Err(e) => warn!(error = %e, "Tool state out of order"),
                    }
                }

                let executions = calls.iter().map(|(_, request)| {
                    let tools = Arc::clone(&this.tools);
                    let name = request.name().to_string();
                    let arguments = request.arguments().clone();
                    async move { tools.execute(&name, arguments).await }
                });
                let results = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    results = join_all(executions) => Some(results),
                };
                let Some(results) = results else {
                    debug!(step, "Turn cancelled during tool execution");
                    return;
                };

                let mut tool_messages = Vec::with_capacity(calls.len());
                for ((invocation, request), result) in calls.iter_mut().zip(results) {
                    let (event, content) = match result {
                        Ok(output) => {
                            let content = tool_message_content(&output);
                            (invocation.complete(output), content)
                        }
                        Err(e) => {
                            let text = e.to_string();
                            (invocation.fail(text.clone()), tool_error_content(&e))
                        }
                    };
                    match event {
                        Ok(event) => {
                            yield event;
                        }
                        Err(e) => warn!(error = %e, "Tool state out of order"),
                    }
                    tool_messages.push(OutboundMessage::tool_result(request.name(), content));
                }

                yield UiEvent::FinishStep;

                if step >= max_steps {
                    info!(
                        message_id = %message_id.0,
                        steps = step,
                        "Step limit reached with tool calls pending"
                    );
                    yield UiEvent::Finish { finish_reason: FinishReason::StepLimit };
                    return;
                }

                context.push(OutboundMessage::assistant_tool_calls(
                    std::mem::take(&mut state.text_so_far),
                    calls.into_iter().map(|(_, request)| request).collect(),
                ));
                context.extend(tool_messages);
                step += 1;
            }
        }
    }
}

fn tool_message_content(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn tool_error_content(error: &ToolError) -> String {
    format!("Error: {error}")
}

// ============================================================================
// Per-step segment state
// ============================================================================

/// Open segments and collected tool calls of one generation pass
#[derive(Debug, Default)]
struct StepState {
    text: Option<SegmentId>,
    reasoning: Option<SegmentId>,
    text_so_far: String,
    calls: Vec<(ToolInvocation, ToolCallRequest)>,
}

impl StepState {
    fn reasoning(&mut self, delta: String) -> Vec<UiEvent> {
        let mut events = Vec::with_capacity(2);
        let id = match &self.reasoning {
            Some(id) => id.clone(),
            None => {
                let id = SegmentId::reasoning();
                events.push(UiEvent::ReasoningStart { id: id.clone() });
                self.reasoning = Some(id.clone());
                id
            }
        };
        events.push(UiEvent::ReasoningDelta { id, delta });
        events
    }

    fn text(&mut self, delta: String) -> Vec<UiEvent> {
        let mut events = self.close_reasoning();
        let id = match &self.text {
            Some(id) => id.clone(),
            None => {
                let id = SegmentId::text();
                events.push(UiEvent::TextStart { id: id.clone() });
                self.text = Some(id.clone());
                id
            }
        };
        self.text_so_far.push_str(&delta);
        events.push(UiEvent::TextDelta { id, delta });
        events
    }

    fn tool_calls(&mut self, calls: Vec<ToolCallRequest>) -> Vec<UiEvent> {
        let mut events = self.close();
        for request in calls {
            let invocation = ToolInvocation::new(request.name());
            events.push(invocation.start_event());
            self.calls.push((invocation, request));
        }
        events
    }

    /// Resolve every collected call as failed, for a step the backend aborted
    fn fail_calls(&mut self, error_text: &str) -> Vec<UiEvent> {
        let mut events = Vec::with_capacity(self.calls.len() * 2);
        for (mut invocation, request) in self.calls.drain(..) {
            let transitions = [
                invocation.input_available(request.arguments().clone()),
                invocation.fail(error_text.to_string()),
            ];
            for transition in transitions {
                match transition {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(error = %e, "Tool state out of order"),
                }
            }
        }
        events
    }

    fn close_reasoning(&mut self) -> Vec<UiEvent> {
        self.reasoning
            .take()
            .map(|id| UiEvent::ReasoningEnd { id })
            .into_iter()
            .collect()
    }

    /// End events for every open segment, reasoning first
    fn close(&mut self) -> Vec<UiEvent> {
        let mut events = self.close_reasoning();
        if let Some(id) = self.text.take() {
            events.push(UiEvent::TextEnd { id });
        }
        events
    }
}
