//! Logging trait for chat session operations.
//!
//! This module provides the [`ChatLogger`] trait that allows callers to capture every request a
//! [`ChatSession`](crate::chat::ChatSession) dispatches and every transcript update it publishes.

use crate::types::{ChatMessage, ChatRequest};

/// A trait for logging chat session operations.
///
/// # Example
///
/// ```rust,ignore
/// use petchat::{ChatLogger, ChatMessage, ChatRequest};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ChatLogger for FileLogger {
///     fn log_request(&self, request: &ChatRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_reply(&self, message: &ChatMessage) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Reply: {}", message.content).unwrap();
///     }
/// }
/// ```
pub trait ChatLogger: Send + Sync {
    /// Log a request just before it is handed to the transport.
    fn log_request(&self, request: &ChatRequest);

    /// Log an intermediate state of a streamed answer.
    ///
    /// Called once per chunk with the full accumulated message, exactly as it was written into
    /// the transcript.
    fn log_stream_update(&self, message: &ChatMessage) {
        _ = message;
    }

    /// Log the final assistant message of a send, streamed or not.
    fn log_reply(&self, message: &ChatMessage);

    /// Log a failure that was surfaced into the transcript as an error bubble.
    fn log_failure(&self, error: &str) {
        _ = error;
    }
}
