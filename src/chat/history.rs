use anyhow::{bail, Result};

use super::message::Message;

/// Ordered conversation, bounded to the most recent `capacity` messages
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn, then drop the oldest messages until at most
    /// `capacity` remain
    pub fn push_turn(&mut self, user: Message, assistant: Message, capacity: usize) {
        self.messages.push(user);
        self.messages.push(assistant);
        self.trim_to(capacity);
    }

    pub fn trim_to(&mut self, capacity: usize) {
        if self.messages.len() > capacity {
            let excess = self.messages.len() - capacity;
            self.messages.drain(..excess);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Assistant reply being streamed, not yet part of the history
///
/// The reply only grows by appending. The session commits the user
/// message and the final reply to the history together once the stream
/// completes, so readers never see a half-built turn.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    user: Message,
    reply: String,
}

impl PendingTurn {
    pub fn new(user: Message) -> Self {
        Self {
            user,
            reply: String::new(),
        }
    }

    pub fn user(&self) -> &Message {
        &self.user
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Replace the reply with a cumulative update that must extend it
    pub fn advance(&mut self, cumulative: &str) -> Result<()> {
        if !cumulative.starts_with(self.reply.as_str()) {
            bail!(
                "partial response does not extend the previous one ({} → {} chars)",
                self.reply.len(),
                cumulative.len()
            );
        }
        self.reply.clear();
        self.reply.push_str(cumulative);
        Ok(())
    }
}
