//! LLM Backend Integration
//!
//! Streaming chat access to an LLM server through a common trait. The
//! sequencer only ever sees [`LlmBackend`]; [`OllamaBackend`] is the
//! production implementation, tests substitute scripted backends.
//!
//! # Usage
//!
//! ```ignore
//! use bridge_core::backend::{ChatRequest, LlmBackend, OllamaBackend, OutboundMessage, OutboundRole};
//!
//! let backend = OllamaBackend::new("http://localhost:11434")?;
//! let request = ChatRequest::new("qwen3", vec![OutboundMessage::new(OutboundRole::User, "Hello!")]);
//! let chunks = backend.stream_chat(&request).await?;
//! ```

mod error;
mod ollama;
mod traits;

pub use error::BackendError;
pub use ollama::{normalize_base_url, OllamaBackend};
pub use traits::{ChatRequest, LlmBackend, ModelInfo, OutboundMessage, OutboundRole};
