//! Assembles a streamed answer from raw body chunks.
//!
//! The assembler owns the decoder and the running text. It knows nothing about transcripts:
//! after every chunk it hands the cumulative text to a `publish` callback, and the session
//! decides where that text goes.

use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::decode::Utf8StreamDecoder;
use crate::error::Error;
use crate::observability::{STREAM_BYTES, STREAM_CHUNKS, STREAM_DURATION, STREAM_ERRORS, STREAM_TTFB};
use crate::transport::ByteStream;

/// Why the assembler stopped reading.
#[derive(Debug, Clone)]
pub enum AssemblyEnd {
    /// The body was read to its end.
    Completed,
    /// The caller cancelled before the body ended.
    Interrupted,
    /// Reading the body failed.
    Failed(Error),
}

/// Result of assembling one streamed answer.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Everything decoded, in arrival order.
    pub content: String,
    /// Number of chunks read.
    pub chunks: usize,
    /// Number of body bytes read.
    pub bytes: usize,
    /// Why reading stopped.
    pub end: AssemblyEnd,
}

impl Assembly {
    /// Returns true if the body was read to its end.
    pub fn is_complete(&self) -> bool {
        matches!(self.end, AssemblyEnd::Completed)
    }
}

/// Incrementally decodes a chunked body into one growing string.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: Utf8StreamDecoder,
    content: String,
    chunks: usize,
    bytes: usize,
}

impl StreamAssembler {
    /// Creates an assembler with an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the accumulated text.
    pub fn push(&mut self, chunk: &[u8]) -> &str {
        self.chunks += 1;
        self.bytes += chunk.len();
        let text = self.decoder.decode(chunk);
        self.content.push_str(&text);
        &self.content
    }

    /// Flushes the decoder; returns true if that changed the accumulated text.
    pub fn flush(&mut self) -> bool {
        let tail = self.decoder.finish();
        self.content.push_str(&tail);
        !tail.is_empty()
    }

    /// Returns the text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reads `body` until it ends, fails, or `cancel` fires.
    ///
    /// `publish` is called after every chunk with the cumulative text, and once more if flushing
    /// the decoder at the end of a complete body changes it. Chunks are applied strictly in arrival order.
    pub async fn run<F>(
        mut self,
        mut body: ByteStream,
        cancel: &CancellationToken,
        mut publish: F,
    ) -> Assembly
    where
        F: FnMut(&str),
    {
        let start = Instant::now();
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break AssemblyEnd::Interrupted,
                next = body.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    if self.chunks == 0 {
                        STREAM_TTFB.add(start.elapsed().as_secs_f64());
                    }
                    STREAM_CHUNKS.click();
                    STREAM_BYTES.count(chunk.len() as u64);
                    publish(self.push(&chunk));
                }
                Some(Err(err)) => {
                    STREAM_ERRORS.click();
                    tracing::warn!(error = %err, chunks = self.chunks, "stream failed mid-body");
                    break AssemblyEnd::Failed(err);
                }
                None => break AssemblyEnd::Completed,
            }
        };
        // A character cut short by a cancel or a failure is dropped, not replaced.
        if matches!(end, AssemblyEnd::Completed) && self.flush() {
            publish(&self.content);
        }
        STREAM_DURATION.add(start.elapsed().as_secs_f64());
        tracing::debug!(
            chunks = self.chunks,
            bytes = self.bytes,
            complete = matches!(end, AssemblyEnd::Completed),
            "stream assembled"
        );
        Assembly {
            content: self.content,
            chunks: self.chunks,
            bytes: self.bytes,
            end,
        }
    }
}
