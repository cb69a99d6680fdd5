//! Collaborator store traits and record filters.
//!
//! Stores are synchronous and `Send + Sync`; sessions call them outside of
//! any await point.

use crate::domain::{Conversation, Roadmap, RoadmapDraft, Topic, Turn};
use crate::error::Result;
use serde::Serialize;

/// Filter operations for querying records.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals value
    Eq,
    /// Field does not equal value
    Ne,
}

/// A filter for querying serialized records.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Field name (as serialized) to filter on
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Ne,
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Check if a record matches this filter.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        let field_value = record.get(&self.field);

        match &self.op {
            FilterOp::Eq => match field_value {
                Some(v) => *v == self.value,
                None => self.value.is_null(),
            },
            FilterOp::Ne => match field_value {
                Some(v) => *v != self.value,
                None => !self.value.is_null(),
            },
        }
    }
}

/// Records addressable by id.
pub trait HasId {
    fn id(&self) -> &str;
}

impl HasId for Turn {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Conversation {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Topic {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Roadmap {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Persisted chat turns
pub trait TurnStore: Send + Sync {
    /// Store a turn, replacing any stored turn with the same id
    fn save(&self, turn: &Turn) -> Result<()>;

    /// Turns of a conversation in creation order
    fn find_history(&self, conversation_id: &str) -> Result<Vec<Turn>>;

    fn count(&self, conversation_id: &str) -> Result<usize>;
}

/// Persisted conversations
pub trait ConversationStore: Send + Sync {
    fn create(&self, conversation: &Conversation) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Conversation>>;

    /// Add to the message count and touch the update timestamp
    fn record_activity(&self, id: &str, added: u32) -> Result<Conversation>;

    fn list(&self) -> Result<Vec<Conversation>>;
}

/// Persisted roadmap topics
pub trait TopicStore: Send + Sync {
    /// Store a topic, assigning an id if it has none
    fn save(&self, topic: Topic) -> Result<Topic>;

    /// Topics of a roadmap ordered by sequence
    fn list_for_roadmap(&self, roadmap_id: &str) -> Result<Vec<Topic>>;
}

/// Persisted roadmaps
pub trait RoadmapStore: Send + Sync {
    fn create_draft(&self, draft: RoadmapDraft) -> Result<Roadmap>;

    fn finalize_counts(&self, id: &str, total_topics: u32) -> Result<Roadmap>;

    fn get_roadmap(&self, id: &str) -> Result<Option<Roadmap>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_eq_matches() {
        let filter = Filter::eq("conversationId", "conv-1");
        let record = json!({"id": "1", "conversationId": "conv-1"});
        assert!(filter.matches(&record));
    }

    #[test]
    fn test_filter_eq_no_match() {
        let filter = Filter::eq("conversationId", "conv-1");
        let record = json!({"id": "1", "conversationId": "conv-2"});
        assert!(!filter.matches(&record));
    }

    #[test]
    fn test_filter_eq_null() {
        let filter = Filter::eq("field", serde_json::Value::Null);
        let record = json!({"id": "1"});
        assert!(filter.matches(&record));
    }

    #[test]
    fn test_filter_ne() {
        let filter = Filter::ne("role", "system");
        assert!(filter.matches(&json!({"role": "user"})));
        assert!(!filter.matches(&json!({"role": "system"})));
    }

    #[test]
    fn test_has_id() {
        let turn = Turn::user("conv-1", "hi");
        assert_eq!(HasId::id(&turn), turn.id);
    }
}
