//! Classification of chat endpoint responses.

/// Content-type marker that identifies an incrementally streamed answer.
pub const STREAM_CONTENT_TYPE: &str = "text/plain";

/// How a response must be consumed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// Non-success status: the body is error text.
    Failure,
    /// Successful plain-text body, read chunk by chunk.
    Stream,
    /// Successful body holding a single JSON reply.
    Json,
}

impl ResponseKind {
    /// Classify a response from its status and declared content type.
    ///
    /// This is a pure function of its inputs; the body is never inspected.
    pub fn classify(status: u16, content_type: Option<&str>) -> Self {
        if !(200..300).contains(&status) {
            return ResponseKind::Failure;
        }
        let streamed = content_type.is_some_and(|value| {
            value
                .to_ascii_lowercase()
                .contains(STREAM_CONTENT_TYPE)
        });
        if streamed {
            ResponseKind::Stream
        } else {
            ResponseKind::Json
        }
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseKind::Failure => write!(f, "failure"),
            ResponseKind::Stream => write!(f, "stream"),
            ResponseKind::Json => write!(f, "json"),
        }
    }
}
