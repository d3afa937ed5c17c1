//! The seam between a chat session and the network.

use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::error::Result;
use crate::types::ChatRequest;

/// A response body delivered as a sequence of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Something that can carry a [`ChatRequest`] to a chat endpoint.
///
/// Implementations return as soon as the response head is available; the body is consumed
/// lazily through [`RawResponse::body`].
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one chat request.
    ///
    /// Returns `Err` only when no response was obtained at all. A response with an error status
    /// is still `Ok`.
    async fn post_chat(&self, request: &ChatRequest) -> Result<RawResponse>;
}

/// Status line, content type and unread body of a response.
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// The response body.
    pub body: ByteStream,
}

impl RawResponse {
    /// Creates a response from its parts.
    pub fn new(status: u16, content_type: Option<String>, body: ByteStream) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads the remaining body into memory.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Reads the remaining body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
