//! NDJSON Stream Decoding
//!
//! Ollama answers a streaming `/api/chat` request with one JSON object per
//! line. This module turns that byte stream into a lazy sequence of
//! [`StreamChunk`] values:
//!
//! ```text
//!  transport reads        LineBuffer            decode_line          ChunkDecoder
//! ┌────────────────┐    ┌─────────────┐    ┌──────────────────┐    ┌──────────────┐
//! │ b"{\"mess"     │───►│ carry-over  │───►│ BackendRecord    │───►│ pending queue│──► StreamChunk
//! │ b"age\":..}\n" │    │ split on \n │    │ → chunk variants │    │ + terminal   │
//! └────────────────┘    └─────────────┘    └──────────────────┘    └──────────────┘
//! ```
//!
//! # Termination
//!
//! The chunk sequence ends after the first terminal chunk: `Done` (explicit
//! `done: true`, or implicit when the upstream closes without one) or
//! `Error` (a backend `error` record or a transport read failure).

mod chunk;
mod decoder;

pub use chunk::{decode_line, StreamChunk, ToolCallFunction, ToolCallRequest};
pub use decoder::{ChunkDecoder, ChunkStream, LineBuffer};
