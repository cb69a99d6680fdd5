//! Session outcome types.
//!
//! This module defines how a streaming session ended.

use super::topic::Topic;

/// Output already streamed when a session stopped early
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialOutput {
    pub content: String,
    pub reasoning: String,
}

impl PartialOutput {
    pub fn new(content: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: reasoning.into(),
        }
    }

    /// None when nothing was streamed
    pub fn non_empty(content: &str, reasoning: &str) -> Option<Self> {
        if content.is_empty() && reasoning.is_empty() {
            None
        } else {
            Some(Self::new(content, reasoning))
        }
    }
}

/// Outcome of a streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResult {
    /// Stream ended normally
    Completed {
        content: String,
        reasoning: Option<String>,
        records: Vec<Topic>,
    },
    /// Stream ended with an error
    Failed {
        reason: String,
        partial: Option<PartialOutput>,
    },
    /// Caller went away or cancelled
    Cancelled { partial: Option<PartialOutput> },
}

impl SessionResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionResult::Completed { .. })
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            SessionResult::Completed { .. } => "completed",
            SessionResult::Failed { .. } => "failed",
            SessionResult::Cancelled { .. } => "cancelled",
        }
    }
}
