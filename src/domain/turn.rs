//! Conversations and the turns they are made of

use crate::id::{generate_conversation_id, generate_turn_id, now_ms};
use crate::llm::Role;
use serde::{Deserialize, Serialize};

/// One persisted message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,

    /// Conversation this turn belongs to
    pub conversation_id: String,

    pub role: Role,
    pub content: String,

    /// Reasoning shown separately from the content (assistant turns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    /// Model that produced the turn (assistant turns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The stream failed before the turn was complete
    #[serde(default)]
    pub truncated: bool,

    pub created_at: u64,
}

impl Turn {
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: generate_turn_id(),
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            thinking: None,
            model: None,
            truncated: false,
            created_at: now_ms(),
        }
    }

    pub fn assistant(conversation_id: impl Into<String>, content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: generate_turn_id(),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: content.into(),
            thinking: None,
            model: Some(model.into()),
            truncated: false,
            created_at: now_ms(),
        }
    }

    /// Attach reasoning, ignoring blank text
    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        let thinking = thinking.into();
        self.thinking = (!thinking.trim().is_empty()).then_some(thinking);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }
}

/// A chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub model: String,
    pub message_count: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Conversation {
    /// Create a conversation titled after its first message
    pub fn new(first_message: &str, model: impl Into<String>, title_max_chars: usize) -> Self {
        let now = now_ms();
        Self {
            id: generate_conversation_id(),
            title: title_from_message(first_message, title_max_chars),
            model: model.into(),
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump the message count and activity timestamp
    pub fn record_activity(&mut self, added: u32) {
        self.message_count = self.message_count.saturating_add(added);
        self.updated_at = now_ms();
    }
}

/// Title for a conversation: the message, cut to `max_chars` with "..." appended
pub fn title_from_message(message: &str, max_chars: usize) -> String {
    let message = message.trim();
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let cut: String = message.chars().take(max_chars).collect();
    format!("{}...", cut)
}
