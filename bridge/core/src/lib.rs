//! Bridge Core - Streaming protocol bridge between Ollama and a chat UI
//!
//! This crate turns the newline-delimited JSON stream produced by an Ollama
//! server into the ordered event protocol a browser chat client renders, and
//! runs the tool-calling loop in between. It has no HTTP server of its own;
//! `bridge-daemon` exposes it over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  POST /api/chat   ┌──────────────────────────────────────┐
//! │   Ollama     │ ◄──────────────── │            EventSequencer            │
//! │   server     │                   │  ┌────────────┐    ┌──────────────┐  │
//! │              │ ── NDJSON bytes ─►│  │  Stream    │───►│  step loop   │  │
//! └──────────────┘                   │  │  Decoder   │    │  (≤ 5 steps) │  │
//!                                    │  └────────────┘    └──────┬───────┘  │
//!                                    │                           │          │
//!                                    │                   ┌───────▼───────┐  │
//!                                    │                   │ ToolRegistry  │  │
//!                                    │                   │ (join_all)    │  │
//!                                    │                   └───────────────┘  │
//!                                    └──────────────────────┬───────────────┘
//!                                                           │ UiEvent stream
//!                                                           ▼
//!                                                    browser / renderer
//! ```
//!
//! # Key Types
//!
//! - [`EventSequencer`]: drives a chat turn and yields [`UiEvent`]s
//! - [`StreamChunk`]: one decoded unit of the backend stream
//! - [`ChunkDecoder`]: carry-over buffer + line classifier over a byte stream
//! - [`ChatMessage`] / [`Conversation`]: the message model the UI folds events into
//! - [`ToolInvocation`]: per-call tool lifecycle state machine
//! - [`OllamaBackend`]: the HTTP client for the backend
//!
//! # Module Overview
//!
//! - [`backend`]: LLM backend abstraction and the Ollama client
//! - [`config`]: TOML + environment configuration and sampling profiles
//! - [`events`]: UI protocol events
//! - [`messages`]: chat messages, parts and the event reducer
//! - [`sequencer`]: the turn/step state machine
//! - [`streaming`]: NDJSON stream decoding
//! - [`tools`]: tool trait, registry, invocation lifecycle and built-in tools

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod events;
pub mod messages;
pub mod sequencer;
pub mod streaming;
pub mod tools;

// Re-exports for convenience
pub use backend::{
    BackendError, ChatRequest, LlmBackend, ModelInfo, OllamaBackend, OutboundMessage,
    OutboundRole,
};
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env,
    BackendSettings, BridgeConfig, BridgeToml, ChatSettings, ConfigError, ConfigOverrides,
    ConfigSource, SamplingOptions, SamplingTable, ServerSettings, ToolSettings,
};
pub use events::{FinishReason, UiEvent};
pub use messages::{
    ChatMessage, Conversation, MessageId, MessagePart, MessageRole, SegmentId, ToolCallId,
};
pub use sequencer::{EventSequencer, EventStream, SequencerConfig, TurnRequest};
pub use streaming::{ChunkDecoder, ChunkStream, LineBuffer, StreamChunk, ToolCallRequest};
pub use tools::{
    Tool, ToolDefinition, ToolError, ToolInvocation, ToolRegistry, ToolState, TransitionError,
};
