//! Bounded conversation history

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions prepended to every request
    System,
    /// What the user said
    User,
    /// What the model replied
    Assistant,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ConversationTurn {
    /// System prompt message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered log of prior turns for the process lifetime
///
/// Storage is capped at `capacity` (oldest evicted first). Only the last
/// `context_turns` entries are ever sent to the model.
#[derive(Debug)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
    context_turns: usize,
}

impl ConversationHistory {
    /// Create an empty history
    ///
    /// `capacity` is raised to at least `context_turns`.
    #[must_use]
    pub fn new(capacity: usize, context_turns: usize) -> Self {
        let capacity = capacity.max(context_turns).max(1);
        Self {
            turns: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            context_turns,
        }
    }

    /// Append a turn, evicting the oldest when full
    pub fn push(&mut self, turn: ConversationTurn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
            tracing::trace!(capacity = self.capacity, "evicted oldest conversation turn");
        }
        self.turns.push_back(turn);
    }

    /// Messages for one request: the system prompt plus the most recent turns
    #[must_use]
    pub fn context(&self, system_prompt: &str) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(self.context_turns);
        std::iter::once(ConversationTurn::system(system_prompt))
            .chain(self.turns.iter().skip(skip).cloned())
            .collect()
    }

    /// Stored turn count
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if nothing has been said yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterate stored turns, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }
}
