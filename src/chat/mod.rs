//! Chat session and the interactive chat application built on it.
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Core chat session management and endpoint interaction
//! - [`commands`]: Slash command parsing and handling

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer, TranscriptFollower};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{
    BASE_URL_ENV, ChatArgs, ChatConfig, DEFAULT_BASE_URL, DEFAULT_CHAT_PATH, DEFAULT_ERROR_PREFIX,
    DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
pub use session::{ChatSession, ChatState, SendOutcome, SessionContext, SessionStats};
