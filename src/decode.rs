//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! A transport is free to cut a body anywhere, including in the middle of a multi-byte
//! character. [`Utf8StreamDecoder`] carries the unfinished tail of one chunk over to the next so
//! that text is only emitted once it is complete.

use std::str;

/// U+FFFD, emitted for every maximal invalid subsequence.
const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// Byte-order mark, dropped when it opens the stream.
const BOM: char = '\u{FEFF}';

/// A stateful, lossy UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
    started: bool,
}

impl Utf8StreamDecoder {
    /// Creates a decoder positioned at the start of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the next chunk, returning all text that is complete so far.
    ///
    /// Up to three trailing bytes of an unfinished character are held back until the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut out = String::with_capacity(chunk.len());
        if self.pending.is_empty() {
            self.pending = decode_into(chunk, &mut out).to_vec();
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            self.pending = decode_into(&joined, &mut out).to_vec();
        }
        self.strip_bom(out)
    }

    /// Flushes the decoder at end of stream.
    ///
    /// An unfinished character left in the buffer can never complete, so it becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        let out = if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT.to_string()
        };
        let out = self.strip_bom(out);
        self.started = false;
        out
    }

    /// Returns the number of bytes held back waiting for the rest of a character.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn strip_bom(&mut self, out: String) -> String {
        if self.started || out.is_empty() {
            return out;
        }
        self.started = true;
        match out.strip_prefix(BOM) {
            Some(rest) => rest.to_string(),
            None => out,
        }
    }
}

/// Decodes `bytes` into `out` and returns the incomplete tail, if any.
fn decode_into<'a>(mut bytes: &'a [u8], out: &mut String) -> &'a [u8] {
    loop {
        match str::from_utf8(bytes) {
            Ok(text) => {
                out.push_str(text);
                return &[];
            }
            Err(err) => {
                let (valid, rest) = bytes.split_at(err.valid_up_to());
                // Borrowed: `valid_up_to` marks the end of a well-formed prefix.
                out.push_str(&String::from_utf8_lossy(valid));
                match err.error_len() {
                    Some(len) => {
                        out.push(REPLACEMENT);
                        bytes = &rest[len..];
                    }
                    None => return rest,
                }
            }
        }
    }
}
