//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction and a [`TranscriptFollower`] that
//! turns successive transcript snapshots into incremental renderer calls, so a reply that is
//! streamed into one transcript entry prints as a growing line of text.

use std::io::{self, Stdout, Write};

use crate::transcript::Transcript;
use crate::types::ChatMessage;

/// ANSI escape code for dim text (used for informational lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text (used for error messages).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Print a chunk of assistant text.
    ///
    /// This is called incrementally as the reply streams in.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when an assistant entry is complete.
    fn finish_response(&mut self);

    /// Called when the reply is interrupted by the user.
    fn print_interrupted(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Consumes the renderer and returns its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_styled(&mut self, style: &str, text: &str) {
        if self.use_color {
            let _ = write!(self.out, "{style}{text}{ANSI_RESET}");
        } else {
            let _ = write!(self.out, "{text}");
        }
        let _ = self.out.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_text(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        let _ = self.out.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.write_styled(ANSI_RED, error);
    }

    fn print_info(&mut self, info: &str) {
        self.write_styled(ANSI_DIM, info);
        let _ = writeln!(self.out);
    }

    fn finish_response(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }

    fn print_interrupted(&mut self) {
        self.write_styled(ANSI_DIM, "[interrupted]");
        let _ = writeln!(self.out);
    }
}

/// Renders new transcript content as it appears.
///
/// User entries are skipped since the user typed them. Assistant entries are printed as deltas
/// against what was already printed; an entry is settled once a later entry exists or
/// [`finish`](Self::finish) is called.
#[derive(Debug, Clone)]
pub struct TranscriptFollower {
    error_prefix: String,
    // Index of the first entry that is not settled.
    next: usize,
    // Bytes of `next`'s content already printed.
    printed: usize,
}

impl TranscriptFollower {
    /// Creates a follower; assistant entries starting with `error_prefix` render as errors.
    pub fn new(error_prefix: impl Into<String>) -> Self {
        Self {
            error_prefix: error_prefix.into(),
            next: 0,
            printed: 0,
        }
    }

    /// Marks everything in `transcript` as already rendered.
    pub fn skip_to(&mut self, transcript: &Transcript) {
        self.next = transcript.len();
        self.printed = 0;
    }

    /// Prints whatever `transcript` has that was not printed yet.
    pub fn update(&mut self, transcript: &Transcript, renderer: &mut dyn Renderer) {
        if transcript.len() < self.next {
            // The transcript was cleared underneath us.
            self.skip_to(transcript);
            return;
        }
        for index in self.next..transcript.len() {
            if let Some(message) = transcript.get(index) {
                self.render(message, renderer);
            }
            if index + 1 < transcript.len() {
                self.settle(renderer);
            }
        }
    }

    /// Prints the rest of `transcript` and settles its last entry.
    pub fn finish(&mut self, transcript: &Transcript, renderer: &mut dyn Renderer) {
        self.update(transcript, renderer);
        if self.next < transcript.len() {
            self.settle(renderer);
        }
    }

    fn render(&mut self, message: &ChatMessage, renderer: &mut dyn Renderer) {
        if !message.is_assistant() {
            return;
        }
        let content = message.content.as_str();
        if self.printed == 0 && !self.error_prefix.is_empty() && content.starts_with(&self.error_prefix) {
            renderer.print_error(content);
            self.printed = content.len();
            return;
        }
        if let Some(delta) = content.get(self.printed..) {
            if !delta.is_empty() {
                renderer.print_text(delta);
                self.printed = content.len();
            }
        }
    }

    fn settle(&mut self, renderer: &mut dyn Renderer) {
        if self.printed > 0 {
            renderer.finish_response();
        }
        self.next += 1;
        self.printed = 0;
    }
}
