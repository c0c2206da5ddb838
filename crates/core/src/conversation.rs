//! Conversation turns and the per-call context window

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Caller speech, as recognized
    User,
    /// Agent reply
    Assistant,
    /// System message (instructions)
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the speaker
    pub role: TurnRole,
    /// Content of the turn
    pub content: String,
    /// When the turn occurred
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Create a system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    /// Get word count
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Conversation history for one call.
///
/// The first turn is always the system prompt. [`truncate`](Self::truncate) keeps the
/// system turn plus the newest `max_turns` non-system turns.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl ConversationContext {
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
            max_turns,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    /// Roll back the latest user turn if it is the last entry.
    ///
    /// Used when no reply could be produced, so the history never ends on an
    /// unanswered user turn.
    pub fn pop_last_user(&mut self) -> Option<Turn> {
        match self.turns.last() {
            Some(turn) if turn.role == TurnRole::User => self.turns.pop(),
            _ => None,
        }
    }

    /// Drop the oldest non-system turns beyond the cap
    pub fn truncate(&mut self) {
        let history = self.history_len();
        if history > self.max_turns {
            let excess = history - self.max_turns;
            self.turns.drain(1..1 + excess);
        }
    }

    /// All turns, system prompt first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_prompt(&self) -> &str {
        &self.turns[0].content
    }

    /// Total turns including the system prompt
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history_len() == 0
    }

    /// Non-system turns
    pub fn history_len(&self) -> usize {
        self.turns.len() - 1
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}
