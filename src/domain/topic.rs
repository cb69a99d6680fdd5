//! Roadmap topics and their learning resources

use crate::id::{generate_topic_id, now_ms};
use serde::{Deserialize, Serialize};

fn default_topic_title() -> String {
    "Untitled Topic".to_string()
}

fn default_estimated_minutes() -> u32 {
    30
}

fn default_resource_type() -> String {
    "article".to_string()
}

fn default_resource_title() -> String {
    "Resource".to_string()
}

/// A learning resource attached to a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "type", default = "default_resource_type")]
    pub kind: String,

    #[serde(default = "default_resource_title")]
    pub title: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub description: String,
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            kind: default_resource_type(),
            title: default_resource_title(),
            url: String::new(),
            description: String::new(),
        }
    }
}

/// A topic as decoded from the model's output, before it is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDraft {
    #[serde(default = "default_topic_title")]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_estimated_minutes")]
    pub estimated_minutes: u32,

    #[serde(default)]
    pub learning_objectives: Vec<String>,

    #[serde(default)]
    pub prerequisites: Vec<String>,

    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Default for TopicDraft {
    fn default() -> Self {
        Self {
            title: default_topic_title(),
            description: String::new(),
            estimated_minutes: default_estimated_minutes(),
            learning_objectives: Vec::new(),
            prerequisites: Vec::new(),
            resources: Vec::new(),
        }
    }
}

/// Progress state of a stored topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopicStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// A stored topic belonging to a roadmap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub roadmap_id: String,

    /// 1-based position within the roadmap (the record ordinal)
    pub sequence_order: u32,

    #[serde(flatten)]
    pub draft: TopicDraft,

    pub status: TopicStatus,
    pub created_at: u64,
}

impl Topic {
    /// Create an unsaved topic from a decoded draft
    pub fn from_draft(roadmap_id: impl Into<String>, sequence_order: u32, draft: TopicDraft) -> Self {
        Self {
            id: String::new(),
            roadmap_id: roadmap_id.into(),
            sequence_order,
            draft,
            status: TopicStatus::NotStarted,
            created_at: now_ms(),
        }
    }

    /// Assign an id if the topic has none yet
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = generate_topic_id();
        }
    }

    pub fn title(&self) -> &str {
        &self.draft.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_defaults_from_empty_object() {
        let draft: TopicDraft = serde_json::from_str("{}").unwrap();
        assert_eq!(draft, TopicDraft::default());
        assert_eq!(draft.title, "Untitled Topic");
        assert_eq!(draft.estimated_minutes, 30);
    }

    #[test]
    fn test_draft_camel_case_fields() {
        let json = r#"{
            "title": "Ownership",
            "estimatedMinutes": 45,
            "learningObjectives": ["borrowing"],
            "resources": [{"url": "https://doc.rust-lang.org/book/"}]
        }"#;
        let draft: TopicDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.title, "Ownership");
        assert_eq!(draft.estimated_minutes, 45);
        assert_eq!(draft.learning_objectives, vec!["borrowing"]);
        assert_eq!(draft.resources[0].kind, "article");
        assert_eq!(draft.resources[0].title, "Resource");
    }

    #[test]
    fn test_topic_serializes_flat() {
        let mut topic = Topic::from_draft("rm-1", 2, TopicDraft::default());
        topic.ensure_id();
        let value = serde_json::to_value(&topic).unwrap();
        assert!(value["id"].as_str().unwrap().starts_with("top-"));
        assert_eq!(value["sequenceOrder"], 2);
        assert_eq!(value["title"], "Untitled Topic");
        assert_eq!(value["status"], "NOT_STARTED");
    }

    #[test]
    fn test_ensure_id_keeps_existing() {
        let mut topic = Topic::from_draft("rm-1", 1, TopicDraft::default());
        topic.id = "top-fixed".to_string();
        topic.ensure_id();
        assert_eq!(topic.id, "top-fixed");
    }
}
