//! Carry-over line buffer and the pull-based chunk decoder.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use memchr::memchr;
use tracing::{debug, trace};

use super::chunk::{decode_line, StreamChunk};

/// Lazy, forward-only sequence of decoded chunks
pub type ChunkStream = BoxStream<'static, StreamChunk>;

/// Byte buffer that yields complete lines across transport reads
///
/// Bytes are kept raw until a `\n` arrives, so a read boundary inside a
/// multi-byte UTF-8 sequence never corrupts the line. Every byte is consumed
/// exactly once.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from a transport read
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next complete, trimmed, non-empty line
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = memchr(b'\n', &self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    /// Take whatever is left after the upstream closed
    ///
    /// The final line of a stream is allowed to lack its newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }

    /// Number of buffered bytes not yet part of a complete line
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes and release the allocation
    pub fn clear(&mut self) {
        self.buffer = Vec::new();
    }
}

/// Pull-based decoder over a chunked byte stream
///
/// Call [`ChunkDecoder::next_chunk`] repeatedly, or convert it with
/// [`ChunkDecoder::into_stream`]. Once a terminal chunk has been returned
/// the upstream is dropped (closing the connection) and `None` follows.
pub struct ChunkDecoder<S> {
    upstream: Option<Pin<Box<S>>>,
    lines: LineBuffer,
    pending: VecDeque<StreamChunk>,
    upstream_closed: bool,
    finished: bool,
}

impl<S, B, E> ChunkDecoder<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    /// Wrap a byte stream
    pub fn new(upstream: S) -> Self {
        Self {
            upstream: Some(Box::pin(upstream)),
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            upstream_closed: false,
            finished: false,
        }
    }

    /// Whether a terminal chunk has been produced
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Pull the next chunk, reading from the upstream as needed
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                if chunk.is_terminal() {
                    self.finish();
                }
                return Some(chunk);
            }

            if self.finished {
                return None;
            }

            if let Some(line) = self.lines.next_line() {
                self.enqueue(decode_line(&line));
                continue;
            }

            if self.upstream_closed {
                if let Some(line) = self.lines.take_remainder() {
                    self.enqueue(decode_line(&line));
                    continue;
                }
                debug!("Upstream closed without a done record, completing implicitly");
                self.finish();
                return Some(StreamChunk::Done { truncated: true });
            }

            let read = match self.upstream.as_mut() {
                Some(upstream) => upstream.next().await,
                None => None,
            };

            match read {
                Some(Ok(bytes)) => {
                    trace!(bytes = bytes.as_ref().len(), "Stream read");
                    self.lines.push(bytes.as_ref());
                }
                Some(Err(e)) => {
                    self.finish();
                    return Some(StreamChunk::Error(format!("stream read failed: {e}")));
                }
                None => {
                    self.upstream_closed = true;
                    self.upstream = None;
                }
            }
        }
    }

    /// Queue the chunks of one line, dropping anything after a terminal one
    fn enqueue(&mut self, chunks: Vec<StreamChunk>) {
        for chunk in chunks {
            let terminal = chunk.is_terminal();
            self.pending.push_back(chunk);
            if terminal {
                break;
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.upstream = None;
        self.pending.clear();
        self.lines.clear();
    }
}

impl<S, B, E> ChunkDecoder<S>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    /// Convert into a boxed [`ChunkStream`]
    pub fn into_stream(self) -> ChunkStream {
        stream::unfold(self, |mut decoder| async move {
            decoder.next_chunk().await.map(|chunk| (chunk, decoder))
        })
        .boxed()
    }
}
