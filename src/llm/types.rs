//! LLM types for OpenAI-compatible chat completion APIs
//!
//! This module defines the message types for LLM requests and responses.

use serde::{Deserialize, Serialize};

use super::LlmError;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default token budget when no model-specific limit is known
pub const DEFAULT_MAX_TOKENS: u32 = 16384;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request to the LLM for completion.
///
/// Serializes directly to the wire body:
/// `{model, messages:[{role,content}], temperature, max_tokens, stream}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl CompletionRequest {
    /// Create a new request for a model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
        }
    }

    /// Add a message to the request
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add a system message
    pub fn with_system_message(self, content: impl Into<String>) -> Self {
        self.with_message(Message::system(content))
    }

    /// Add a user message
    pub fn with_user_message(self, content: impl Into<String>) -> Self {
        self.with_message(Message::user(content))
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the streaming flag
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Check the request is sendable: at least one message and a positive token budget
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.messages.is_empty() {
            return Err(LlmError::InvalidRequest("message list is empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(LlmError::InvalidRequest("max_tokens must be > 0".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(LlmError::InvalidRequest("model id is empty".to_string()));
        }
        Ok(())
    }
}

/// Response from a non-streaming completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub reasoning: Option<String>,
    pub model: String,
    pub usage: Usage,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Create new usage stats
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
