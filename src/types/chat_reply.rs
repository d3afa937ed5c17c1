use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A complete, non-streamed answer from the chat endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// The assistant's answer.
    #[serde(default)]
    pub content: String,
}

impl ChatReply {
    /// Create a new `ChatReply`.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Parse a reply body.
    ///
    /// The endpoint is lenient about the shape of `content`: a missing field, `null`, or a body
    /// that is not an object all yield an empty answer, and non-string values are kept as their
    /// JSON text. Only a body that is not JSON at all is an error.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        let content = match value.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        Ok(Self { content })
    }
}
