// Public modules
pub mod chat_message;
pub mod chat_reply;
pub mod chat_request;

// Re-exports
pub use chat_message::{ChatMessage, ChatRole};
pub use chat_reply::ChatReply;
pub use chat_request::ChatRequest;
