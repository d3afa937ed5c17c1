//! Ordered conversation log with copy-on-write snapshots.
//!
//! A [`Transcript`] is cheap to clone and every clone is an immutable snapshot: `append` and
//! `replace` copy the underlying storage when it is shared, so anyone holding an earlier
//! snapshot keeps seeing exactly what was published to them.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::ChatMessage;

/// Opaque reference to one transcript entry.
///
/// Handles are issued by [`Transcript::append`] and stay valid until the transcript is cleared.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(u64);

/// An ordered sequence of chat messages.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Arc<Vec<ChatMessage>>,
    // Handle id of `messages[0]`. Ids are contiguous, so resolving a handle is a subtraction.
    first_id: u64,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns a handle to it.
    pub fn append(&mut self, message: ChatMessage) -> MessageHandle {
        let handle = self.next_handle();
        Arc::make_mut(&mut self.messages).push(message);
        handle
    }

    /// Returns the handle the next `append` will issue.
    pub fn next_handle(&self) -> MessageHandle {
        MessageHandle(self.first_id + self.messages.len() as u64)
    }

    /// Overwrites the entry behind `handle`.
    pub fn replace(&mut self, handle: MessageHandle, message: ChatMessage) -> Result<()> {
        let Some(position) = self.position(handle) else {
            return Err(Error::stale_handle(format!(
                "handle {} is outside a transcript of {} messages",
                handle.0,
                self.messages.len()
            )));
        };
        Arc::make_mut(&mut self.messages)[position] = message;
        Ok(())
    }

    /// Resolves a handle to its current position.
    pub fn position(&self, handle: MessageHandle) -> Option<usize> {
        let position = usize::try_from(handle.0.checked_sub(self.first_id)?).ok()?;
        (position < self.messages.len()).then_some(position)
    }

    /// Returns the message behind `handle`.
    pub fn resolve(&self, handle: MessageHandle) -> Option<&ChatMessage> {
        self.position(handle).map(|position| &self.messages[position])
    }

    /// Removes every message and invalidates all outstanding handles.
    pub fn clear(&mut self) {
        self.first_id += self.messages.len() as u64;
        self.messages = Arc::new(Vec::new());
    }

    /// Returns the message at `index`.
    pub fn get(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    /// Returns the most recent message.
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterates over the messages in conversation order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    /// Returns the messages as a slice.
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Copies the messages out.
    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.as_ref().clone()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
