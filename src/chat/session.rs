//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the transcript, dispatches one
//! request per send, and folds the endpoint's answer back into the transcript: as a single
//! message for JSON replies, or as one slot that is rewritten chunk by chunk for streamed ones.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::assembler::{AssemblyEnd, StreamAssembler};
use crate::chat::config::ChatConfig;
use crate::chat_logger::ChatLogger;
use crate::client::ChatClient;
use crate::error::{Error, Result};
use crate::interpret::ResponseKind;
use crate::observability::{
    SESSION_FAILURES, SESSION_INTERRUPTS, SESSION_SEND_DURATION, SESSION_SENDS,
    SESSION_SENDS_IGNORED, SESSION_SENDS_REJECTED,
};
use crate::transcript::{MessageHandle, Transcript};
use crate::transport::{ByteStream, ChatTransport};
use crate::types::{ChatMessage, ChatReply, ChatRequest, ChatRole};

/// Lifecycle of a send.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ChatState {
    /// Ready to accept a send.
    #[default]
    Idle,
    /// A request is in flight and no streamed body has started.
    Sending,
    /// A streamed answer is being written into the transcript.
    Streaming,
}

impl std::fmt::Display for ChatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatState::Idle => write!(f, "idle"),
            ChatState::Sending => write!(f, "sending"),
            ChatState::Streaming => write!(f, "streaming"),
        }
    }
}

/// Who is chatting and about which pet.
///
/// The session only reads this while sending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// The signed-in user. Sends are ignored without one.
    pub user_id: Option<String>,
    /// The active pet, if any.
    pub animal_id: Option<String>,
}

impl SessionContext {
    /// Creates a context for the given user.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            animal_id: None,
        }
    }

    /// Sets the active pet.
    pub fn with_animal(mut self, animal_id: impl Into<String>) -> Self {
        self.animal_id = Some(animal_id.into());
        self
    }
}

/// What a call to [`ChatSession::send`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty text or no user: nothing happened.
    Ignored,
    /// A JSON reply was appended.
    Replied {
        /// The assistant message.
        reply: MessageHandle,
    },
    /// A streamed reply was read to its end.
    Streamed {
        /// The assistant message that was rewritten while streaming.
        reply: MessageHandle,
        /// Number of body chunks read.
        chunks: usize,
    },
    /// The request or its response failed and an error message was appended.
    Failed {
        /// The error message.
        reply: MessageHandle,
    },
    /// The caller cancelled the send.
    Interrupted {
        /// The partially streamed message, if streaming had started.
        reply: Option<MessageHandle>,
    },
}

impl SendOutcome {
    /// Returns the assistant message this send produced, if any.
    pub fn reply(&self) -> Option<MessageHandle> {
        match self {
            SendOutcome::Ignored => None,
            SendOutcome::Replied { reply }
            | SendOutcome::Streamed { reply, .. }
            | SendOutcome::Failed { reply } => Some(*reply),
            SendOutcome::Interrupted { reply } => *reply,
        }
    }

    /// Returns true if the send was a silent no-op.
    pub fn is_ignored(&self) -> bool {
        matches!(self, SendOutcome::Ignored)
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The number of messages in the transcript.
    pub message_count: usize,
    /// The current state.
    pub state: ChatState,
    /// The signed-in user, if any.
    pub user_id: Option<String>,
    /// The active pet, if any.
    pub animal_id: Option<String>,
    /// The model requested.
    pub model: String,
    /// The sampling temperature requested.
    pub temperature: f32,
    /// Whether the whole conversation is sent.
    pub include_history: bool,
    /// Sends that reached the endpoint.
    pub total_sends: u64,
    /// Sends answered with a JSON reply.
    pub json_replies: u64,
    /// Sends answered with a stream that completed.
    pub streamed_replies: u64,
    /// Sends that ended with an error message.
    pub failures: u64,
    /// Sends the caller cancelled.
    pub interruptions: u64,
}

#[derive(Debug, Default)]
struct SessionCounters {
    sends: AtomicU64,
    json_replies: AtomicU64,
    streamed_replies: AtomicU64,
    failures: AtomicU64,
    interruptions: AtomicU64,
}

impl SessionCounters {
    fn record(&self, outcome: &SendOutcome) {
        let counter = match outcome {
            SendOutcome::Ignored => return,
            SendOutcome::Replied { .. } => &self.json_replies,
            SendOutcome::Streamed { .. } => &self.streamed_replies,
            SendOutcome::Failed { .. } => &self.failures,
            SendOutcome::Interrupted { .. } => &self.interruptions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the session to `Idle` when a send ends, however it ends.
struct BusyGuard<'a> {
    state: &'a watch::Sender<ChatState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(ChatState::Idle);
    }
}

/// A chat session that owns a transcript and talks to one chat endpoint.
///
/// `send` takes `&self`, so a session can be shared while a response streams in. Only one send
/// runs at a time; others are rejected with [`Error::Busy`].
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    config: ChatConfig,
    context: SessionContext,
    transcript: watch::Sender<Transcript>,
    state: watch::Sender<ChatState>,
    logger: Option<Arc<dyn ChatLogger>>,
    counters: SessionCounters,
}

impl ChatSession {
    /// Creates a new chat session backed by the live HTTP client.
    pub fn new(client: ChatClient, config: ChatConfig) -> Self {
        Self::with_transport(Arc::new(client), config)
    }

    /// Creates a new chat session with a custom transport.
    pub fn with_transport(transport: Arc<dyn ChatTransport>, config: ChatConfig) -> Self {
        let (transcript, _) = watch::channel(Transcript::new());
        let (state, _) = watch::channel(ChatState::Idle);
        Self {
            transport,
            config,
            context: SessionContext::default(),
            transcript,
            state,
            logger: None,
            counters: SessionCounters::default(),
        }
    }

    /// Sets the user and pet context.
    pub fn with_context(mut self, context: SessionContext) -> Self {
        self.context = context;
        self
    }

    /// Attaches a logger that sees every request and transcript update.
    pub fn with_logger(mut self, logger: Arc<dyn ChatLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Sends a message with no way to cancel it.
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        self.send_with_cancel(text, &CancellationToken::new()).await
    }

    /// Sends a message and folds the answer into the transcript.
    ///
    /// This method:
    /// 1. Ignores empty text and sends without a user
    /// 2. Appends the user message before any network I/O
    /// 3. Posts one request for it
    /// 4. Appends the reply, streams it into a placeholder, or appends an error message
    ///
    /// Cancelling `cancel` stops the send at its next suspension point and keeps whatever was
    /// already written to the transcript.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if another send is still running. Every other failure is written
    /// into the transcript as an assistant message.
    pub async fn send_with_cancel(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome> {
        let Some(user_id) = self.context.user_id.as_deref() else {
            SESSION_SENDS_IGNORED.click();
            return Ok(SendOutcome::Ignored);
        };
        if text.trim().is_empty() {
            SESSION_SENDS_IGNORED.click();
            return Ok(SendOutcome::Ignored);
        }
        let _busy = self.begin()?;

        SESSION_SENDS.click();
        self.counters.sends.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        self.append(ChatMessage::user(text));
        let request = self.build_request(user_id, text);
        if let Some(logger) = &self.logger {
            logger.log_request(&request);
        }
        tracing::debug!(
            user_id,
            animal_id = request.animal_id.as_deref(),
            messages = request.messages.len(),
            "dispatching chat request"
        );

        let outcome = self.dispatch(&request, cancel).await;
        self.counters.record(&outcome);
        SESSION_SEND_DURATION.add(start.elapsed().as_secs_f64());
        Ok(outcome)
    }

    async fn dispatch(&self, request: &ChatRequest, cancel: &CancellationToken) -> SendOutcome {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.interrupted(None),
            response = self.transport.post_chat(request) => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "chat request failed");
                return self.fail(&err.to_string());
            }
        };

        let kind = ResponseKind::classify(response.status, response.content_type.as_deref());
        tracing::debug!(status = response.status, %kind, "classified chat response");
        match kind {
            ResponseKind::Failure => {
                let status = response.status;
                let body = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.interrupted(None),
                    body = response.text() => body,
                };
                match body {
                    Ok(text) => {
                        let err = Error::api(status, text.clone());
                        tracing::warn!(error = %err, "chat endpoint returned an error status");
                        // The body is surfaced verbatim, without the error's own prefix.
                        self.fail(&text)
                    }
                    Err(err) => {
                        tracing::warn!(status, error = %err, "chat endpoint returned an error status");
                        self.fail(&err.to_string())
                    }
                }
            }
            ResponseKind::Json => {
                let body = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.interrupted(None),
                    body = response.bytes() => body,
                };
                match body.and_then(|body| ChatReply::from_slice(&body)) {
                    Ok(reply) => {
                        let message = ChatMessage::assistant(reply.content);
                        if let Some(logger) = &self.logger {
                            logger.log_reply(&message);
                        }
                        SendOutcome::Replied {
                            reply: self.append(message),
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "chat reply was not valid JSON");
                        self.fail(&err.to_string())
                    }
                }
            }
            ResponseKind::Stream => self.stream_reply(response.body, cancel).await,
        }
    }

    async fn stream_reply(&self, body: ByteStream, cancel: &CancellationToken) -> SendOutcome {
        self.state.send_replace(ChatState::Streaming);
        let handle = self.append(ChatMessage::assistant(""));

        let assembly = StreamAssembler::new()
            .run(body, cancel, |content| {
                let message = ChatMessage::assistant(content);
                if let Some(logger) = &self.logger {
                    logger.log_stream_update(&message);
                }
                self.replace(handle, message);
            })
            .await;

        match assembly.end {
            AssemblyEnd::Completed => {
                if let Some(logger) = &self.logger {
                    logger.log_reply(&ChatMessage::assistant(assembly.content));
                }
                SendOutcome::Streamed {
                    reply: handle,
                    chunks: assembly.chunks,
                }
            }
            AssemblyEnd::Interrupted => self.interrupted(Some(handle)),
            AssemblyEnd::Failed(err) => {
                let text = format!("{}{}", self.config.error_prefix, err);
                SESSION_FAILURES.click();
                if let Some(logger) = &self.logger {
                    logger.log_failure(&text);
                }
                let reply = if assembly.content.is_empty() {
                    self.replace(handle, ChatMessage::assistant(text));
                    handle
                } else {
                    self.append(ChatMessage::assistant(text))
                };
                SendOutcome::Failed { reply }
            }
        }
    }

    fn build_request(&self, user_id: &str, text: &str) -> ChatRequest {
        let request = ChatRequest::new(
            user_id,
            self.context.animal_id.clone(),
            ChatMessage::user(text),
            self.config.temperature,
            self.config.model.clone(),
        );
        if !self.config.include_history {
            return request;
        }
        let history = self
            .transcript
            .borrow()
            .iter()
            .filter(|m| m.role != ChatRole::System && !m.content.is_empty())
            .cloned()
            .collect();
        request.with_messages(history)
    }

    fn begin(&self) -> Result<BusyGuard<'_>> {
        let mut observed = ChatState::Idle;
        let acquired = self.state.send_if_modified(|state| {
            observed = *state;
            if *state == ChatState::Idle {
                *state = ChatState::Sending;
                true
            } else {
                false
            }
        });
        if acquired {
            Ok(BusyGuard { state: &self.state })
        } else {
            SESSION_SENDS_REJECTED.click();
            tracing::debug!(state = %observed, "rejected send while busy");
            Err(Error::busy(observed))
        }
    }

    fn append(&self, message: ChatMessage) -> MessageHandle {
        // Appends only happen inside a send, and only one send runs at a time.
        let handle = self.transcript.borrow().next_handle();
        self.transcript.send_modify(|transcript| {
            let appended = transcript.append(message);
            debug_assert_eq!(appended, handle);
        });
        handle
    }

    fn replace(&self, handle: MessageHandle, message: ChatMessage) {
        self.transcript
            .send_if_modified(|transcript| match transcript.replace(handle, message) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, "dropped transcript update");
                    false
                }
            });
    }

    fn fail(&self, text: &str) -> SendOutcome {
        let text = format!("{}{}", self.config.error_prefix, text);
        SESSION_FAILURES.click();
        if let Some(logger) = &self.logger {
            logger.log_failure(&text);
        }
        SendOutcome::Failed {
            reply: self.append(ChatMessage::assistant(text)),
        }
    }

    fn interrupted(&self, reply: Option<MessageHandle>) -> SendOutcome {
        SESSION_INTERRUPTS.click();
        tracing::debug!(streamed = reply.is_some(), "chat send interrupted");
        SendOutcome::Interrupted { reply }
    }

    /// Returns a snapshot of the transcript.
    pub fn transcript(&self) -> Transcript {
        self.transcript.borrow().clone()
    }

    /// Subscribes to transcript snapshots. Every append and replace publishes a new one.
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.transcript.subscribe()
    }

    /// Returns the current state.
    pub fn state(&self) -> ChatState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Returns true while a send is running.
    pub fn is_busy(&self) -> bool {
        self.state() != ChatState::Idle
    }

    /// Clears the conversation history.
    pub fn clear(&mut self) {
        self.transcript.send_modify(Transcript::clear);
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.transcript.borrow().len()
    }

    /// Returns the user and pet context.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Sets or clears the signed-in user.
    pub fn set_user(&mut self, user_id: Option<String>) {
        self.context.user_id = user_id;
    }

    /// Sets or clears the active pet.
    pub fn set_animal(&mut self, animal_id: Option<String>) {
        self.context.animal_id = animal_id;
    }

    /// Changes the model used for responses.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    /// Returns the current model.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sets the sampling temperature.
    pub fn set_temperature(&mut self, temperature: f32) {
        self.config.temperature = temperature;
    }

    /// Sets whether the whole conversation is sent with every request.
    pub fn set_include_history(&mut self, include_history: bool) {
        self.config.include_history = include_history;
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            message_count: self.message_count(),
            state: self.state(),
            user_id: self.context.user_id.clone(),
            animal_id: self.context.animal_id.clone(),
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            include_history: self.config.include_history,
            total_sends: self.counters.sends.load(Ordering::Relaxed),
            json_replies: self.counters.json_replies.load(Ordering::Relaxed),
            streamed_replies: self.counters.streamed_replies.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            interruptions: self.counters.interruptions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockResponse, MockTransport};

    fn session(responses: Vec<MockResponse>) -> (ChatSession, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::scripted(responses));
        let session = ChatSession::with_transport(transport.clone(), ChatConfig::new())
            .with_context(SessionContext::new("u1"));
        (session, transport)
    }

    fn contents(session: &ChatSession) -> Vec<(ChatRole, String)> {
        session
            .transcript()
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[test]
    fn new_session_empty() {
        let (session, _) = session(vec![]);
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.state(), ChatState::Idle);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn whitespace_is_ignored() {
        let (session, transport) = session(vec![MockResponse::json("unused")]);
        let outcome = session.send("  \n\t").await.unwrap();
        assert!(outcome.is_ignored());
        assert_eq!(session.message_count(), 0);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn json_reply_appends_two_messages() {
        let (session, transport) = session(vec![MockResponse::json("hello")]);
        let outcome = session.send("hi").await.unwrap();

        assert!(matches!(outcome, SendOutcome::Replied { .. }));
        assert_eq!(
            contents(&session),
            vec![
                (ChatRole::User, "hi".to_string()),
                (ChatRole::Assistant, "hello".to_string())
            ]
        );
        assert!(!session.is_busy());

        let request = &transport.requests()[0];
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.messages, vec![ChatMessage::user("hi")]);
        assert_eq!(request.model, "gpt-4.1");
    }

    #[tokio::test]
    async fn malformed_json_becomes_error_message() {
        let (session, _) = session(vec![MockResponse::raw_json("not json")]);
        let outcome = session.send("hi").await.unwrap();

        assert!(matches!(outcome, SendOutcome::Failed { .. }));
        let last = session.transcript().last().cloned().unwrap();
        assert!(last.is_assistant());
        assert!(last.content.starts_with("에러: "), "{}", last.content);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn connection_failure_becomes_error_message() {
        let (session, _) = session(vec![MockResponse::refused("connection refused")]);
        let outcome = session.send("hi").await.unwrap();

        assert!(matches!(outcome, SendOutcome::Failed { .. }));
        assert_eq!(session.message_count(), 2);
        assert_eq!(
            session.transcript().last().unwrap().content,
            "에러: Connection error: connection refused"
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_and_appends_error() {
        let (session, _) = session(vec![MockResponse::text_stream(["par", "tial"]).then_fail("reset")]);
        let outcome = session.send("hi").await.unwrap();

        let SendOutcome::Failed { reply } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(
            contents(&session),
            vec![
                (ChatRole::User, "hi".to_string()),
                (ChatRole::Assistant, "partial".to_string()),
                (
                    ChatRole::Assistant,
                    "에러: Streaming error: reset".to_string()
                ),
            ]
        );
        assert_eq!(session.transcript().position(reply), Some(2));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn failure_before_first_chunk_replaces_placeholder() {
        let (session, _) = session(vec![MockResponse::text_stream(Vec::<&str>::new()).then_fail("reset")]);
        session.send("hi").await.unwrap();

        assert_eq!(
            contents(&session),
            vec![
                (ChatRole::User, "hi".to_string()),
                (
                    ChatRole::Assistant,
                    "에러: Streaming error: reset".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn history_mode_sends_conversation() {
        let (mut session, transport) = session(vec![
            MockResponse::json("first answer"),
            MockResponse::json("second answer"),
        ]);
        session.send("first").await.unwrap();
        session.set_include_history(true);
        session.send("second").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(
            requests[1].messages,
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("first answer"),
                ChatMessage::user("second"),
            ]
        );
    }

    #[tokio::test]
    async fn animal_context_is_sent() {
        let (mut session, transport) = session(vec![MockResponse::json("ok")]);
        session.set_animal(Some("pet-3".to_string()));
        session.send("hi").await.unwrap();
        assert_eq!(transport.requests()[0].animal_id.as_deref(), Some("pet-3"));
    }

    #[tokio::test]
    async fn clear_session() {
        let (mut session, _) = session(vec![MockResponse::json("hello")]);
        session.send("hi").await.unwrap();
        assert_eq!(session.message_count(), 2);

        session.clear();
        assert_eq!(session.message_count(), 0);
    }

    #[tokio::test]
    async fn stats_count_outcomes() {
        let (session, _) = session(vec![
            MockResponse::json("a"),
            MockResponse::text_stream(["b"]),
            MockResponse::error(500, "c"),
        ]);
        session.send("1").await.unwrap();
        session.send("2").await.unwrap();
        session.send("3").await.unwrap();
        session.send(" ").await.unwrap();

        let stats = session.stats();
        assert_eq!(stats.total_sends, 3);
        assert_eq!(stats.json_replies, 1);
        assert_eq!(stats.streamed_replies, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.message_count, 6);
        assert_eq!(stats.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn set_model() {
        let (mut session, _) = session(vec![]);
        assert_eq!(session.model(), "gpt-4.1");
        session.set_model("gpt-4.1-mini");
        assert_eq!(session.model(), "gpt-4.1-mini");
    }
}
