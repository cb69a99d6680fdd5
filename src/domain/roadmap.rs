//! Roadmap records and the request that produces them

use crate::id::{generate_roadmap_id, now_ms};
use serde::{Deserialize, Serialize};

/// Title used when the request carries no title
pub const DEFAULT_ROADMAP_TITLE: &str = "AI Roadmap";

/// Weeks assumed when estimating a fresh roadmap
pub const DEFAULT_ESTIMATED_WEEKS: u32 = 4;

/// Lifecycle of a roadmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoadmapStatus {
    /// Created while topics are still streaming
    Draft,
    Active,
    Completed,
    Archived,
}

/// What the user asked a roadmap for
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub goal: String,
    #[serde(default)]
    pub current_level: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub hours_per_week: u32,
    #[serde(default)]
    pub learning_style: String,
    /// Model id; blank selects the default
    #[serde(default)]
    pub model: String,
}

impl RoadmapRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            hours_per_week: 5,
            ..Default::default()
        }
    }
}

/// Input to `RoadmapStore::create_draft`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapDraft {
    pub title: String,
    pub description: String,
    pub estimated_hours: u32,
    pub estimated_weeks: u32,
    pub model: String,
}

impl RoadmapDraft {
    /// Derive the draft a streaming session creates on its first topic
    pub fn from_request(request: &RoadmapRequest, model: &str) -> Self {
        let title = request.title.trim();
        let title = if title.is_empty() {
            DEFAULT_ROADMAP_TITLE.to_string()
        } else {
            title.to_string()
        };
        Self {
            title,
            description: request.description.clone(),
            estimated_hours: request.hours_per_week.saturating_mul(DEFAULT_ESTIMATED_WEEKS),
            estimated_weeks: DEFAULT_ESTIMATED_WEEKS,
            model: model.to_string(),
        }
    }
}

/// A stored roadmap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_hours: u32,
    pub estimated_weeks: u32,
    pub model: String,
    pub status: RoadmapStatus,
    pub total_topics: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Roadmap {
    pub fn from_draft(draft: RoadmapDraft) -> Self {
        let now = now_ms();
        Self {
            id: generate_roadmap_id(),
            title: draft.title,
            description: draft.description,
            estimated_hours: draft.estimated_hours,
            estimated_weeks: draft.estimated_weeks,
            model: draft.model,
            status: RoadmapStatus::Draft,
            total_topics: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the final topic count
    pub fn finalize_counts(&mut self, total_topics: u32) {
        self.total_topics = total_topics;
        self.updated_at = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_from_request() {
        let mut request = RoadmapRequest::new("Learn Rust");
        request.title = "Rust in a month".to_string();
        request.description = "systems".to_string();
        request.hours_per_week = 6;
        let draft = RoadmapDraft::from_request(&request, "m");
        assert_eq!(draft.title, "Rust in a month");
        assert_eq!(draft.description, "systems");
        assert_eq!(draft.estimated_hours, 24);
        assert_eq!(draft.estimated_weeks, 4);
        assert_eq!(draft.model, "m");
    }

    #[test]
    fn test_draft_default_title() {
        let draft = RoadmapDraft::from_request(&RoadmapRequest::new("Learn Go"), "m");
        assert_eq!(draft.title, DEFAULT_ROADMAP_TITLE);
        assert_eq!(draft.description, "");
    }

    #[test]
    fn test_roadmap_from_draft_is_draft() {
        let draft = RoadmapDraft::from_request(&RoadmapRequest::new("Go"), "m");
        let mut roadmap = Roadmap::from_draft(draft);
        assert!(roadmap.id.starts_with("rm-"));
        assert_eq!(roadmap.status, RoadmapStatus::Draft);
        assert_eq!(roadmap.total_topics, 0);

        roadmap.finalize_counts(7);
        assert_eq!(roadmap.total_topics, 7);
        assert!(roadmap.updated_at >= roadmap.created_at);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&RoadmapStatus::Draft).unwrap(), "\"DRAFT\"");
    }
}
