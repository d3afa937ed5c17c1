// Public modules
pub mod assembler;
pub mod chat;
pub mod chat_logger;
pub mod client;
pub mod decode;
pub mod error;
pub mod interpret;
pub mod mock;
pub mod observability;
pub mod render;
pub mod transcript;
pub mod transport;
pub mod types;

// Re-exports
pub use assembler::{Assembly, AssemblyEnd, StreamAssembler};
pub use chat::{ChatConfig, ChatSession, ChatState, SendOutcome, SessionContext, SessionStats};
pub use chat_logger::ChatLogger;
pub use client::ChatClient;
pub use decode::Utf8StreamDecoder;
pub use error::{Error, Result};
pub use interpret::ResponseKind;
pub use mock::{MockResponse, MockTransport};
pub use observability::register_biometrics;
pub use transcript::{MessageHandle, Transcript};
pub use transport::{ByteStream, ChatTransport, RawResponse};
pub use types::*;
