//! Offline transports.
//!
//! [`MockTransport`] answers chat requests without a network: either with canned echo replies,
//! the way the dashboard's mock chat hook does, or from a script of responses queued by a test.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures::{StreamExt, stream};

use crate::error::{Error, Result};
use crate::transport::{ByteStream, ChatTransport, RawResponse};
use crate::types::ChatRequest;

/// Prefix of the echo transport's answers.
pub const ECHO_PREFIX: &str = "🐶 Temp response: ";

/// Delay before the echo transport answers.
pub const ECHO_DELAY: Duration = Duration::from_millis(500);

/// One scripted response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    content_type: Option<String>,
    chunks: Vec<std::result::Result<Bytes, String>>,
    chunk_delay: Duration,
    stall: bool,
    refuse: Option<String>,
}

impl MockResponse {
    fn new(status: u16, content_type: Option<&str>, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(String::from),
            chunks: chunks.into_iter().map(Ok).collect(),
            chunk_delay: Duration::ZERO,
            stall: false,
            refuse: None,
        }
    }

    /// A `200` JSON reply of the form `{"content": ...}`.
    pub fn json(content: &str) -> Self {
        let body = serde_json::json!({ "content": content }).to_string();
        Self::raw_json(&body)
    }

    /// A `200` reply with an arbitrary body declared as JSON.
    pub fn raw_json(body: &str) -> Self {
        Self::new(
            200,
            Some("application/json"),
            vec![Bytes::copy_from_slice(body.as_bytes())],
        )
    }

    /// A `200` plain-text body delivered as the given chunks.
    pub fn text_stream<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let chunks = chunks
            .into_iter()
            .map(|chunk| Bytes::copy_from_slice(chunk.as_ref()))
            .collect();
        Self::new(200, Some("text/plain; charset=utf-8"), chunks)
    }

    /// An error status with a text body.
    pub fn error(status: u16, body: &str) -> Self {
        Self::new(
            status,
            Some("text/plain"),
            vec![Bytes::copy_from_slice(body.as_bytes())],
        )
    }

    /// No response at all: the request fails as if the connection was refused.
    pub fn refused(message: &str) -> Self {
        let mut response = Self::new(0, None, Vec::new());
        response.refuse = Some(message.to_string());
        response
    }

    /// After the scripted chunks, fail the body with a streaming error.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.chunks.push(Err(message.to_string()));
        self
    }

    /// After the scripted chunks, never produce another one.
    pub fn then_stall(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Wait this long before every chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    fn into_raw(self) -> Result<RawResponse> {
        if let Some(message) = self.refuse {
            return Err(Error::connection(message, None));
        }
        let delay = self.chunk_delay;
        let chunks = stream::iter(self.chunks).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            chunk.map_err(|message| Error::streaming(message, None))
        });
        let body: ByteStream = if self.stall {
            Box::pin(chunks.chain(stream::pending()))
        } else {
            Box::pin(chunks)
        };
        Ok(RawResponse::new(self.status, self.content_type, body))
    }
}

#[derive(Debug)]
enum Mode {
    Echo,
    Scripted(Mutex<VecDeque<MockResponse>>),
}

/// A transport that never touches the network.
#[derive(Debug)]
pub struct MockTransport {
    mode: Mode,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockTransport {
    /// Answers every message with `"🐶 Temp response: <message>"` after half a second.
    pub fn echo() -> Self {
        Self {
            mode: Mode::Echo,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers requests with the given responses, in order.
    pub fn scripted<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = MockResponse>,
    {
        Self {
            mode: Mode::Scripted(Mutex::new(responses.into_iter().collect())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    fn record(&self, request: &ChatRequest) {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for MockTransport {
    async fn post_chat(&self, request: &ChatRequest) -> Result<RawResponse> {
        self.record(request);
        match &self.mode {
            Mode::Echo => {
                tokio::time::sleep(ECHO_DELAY).await;
                let message = request
                    .latest()
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                MockResponse::json(&format!("{ECHO_PREFIX}{message}")).into_raw()
            }
            Mode::Scripted(responses) => {
                let next = match responses.lock() {
                    Ok(mut responses) => responses.pop_front(),
                    Err(poisoned) => poisoned.into_inner().pop_front(),
                };
                match next {
                    Some(response) => response.into_raw(),
                    None => Err(Error::connection("mock transport has no scripted response", None)),
                }
            }
        }
    }
}
