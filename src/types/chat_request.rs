use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Body of a `POST /api/chat` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Identifier of the signed-in user.
    pub user_id: String,

    /// Identifier of the pet the conversation is about, if one is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animal_id: Option<String>,

    /// Messages sent to the endpoint.
    ///
    /// By default this holds only the message being sent; the server is expected to keep its own
    /// history keyed by user and animal.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Model identifier.
    pub model: String,
}

impl ChatRequest {
    /// Create a request carrying a single user message.
    pub fn new(
        user_id: impl Into<String>,
        animal_id: Option<String>,
        message: ChatMessage,
        temperature: f32,
        model: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            animal_id,
            messages: vec![message],
            temperature,
            model: model.into(),
        }
    }

    /// Replace the messages with the given history.
    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Returns the most recent message, which is the one being sent.
    pub fn latest(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
