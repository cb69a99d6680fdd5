//! In-memory store, used by tests and `--ephemeral` runs

use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::{ConversationStore, RoadmapStore, TopicStore, TurnStore};
use crate::domain::{Conversation, Roadmap, RoadmapDraft, Topic, Turn};
use crate::error::{NexusError, Result};

/// Store keeping every record in process memory
#[derive(Default)]
pub struct MemoryStore {
    turns: RwLock<Vec<Turn>>,
    conversations: RwLock<HashMap<String, Conversation>>,
    topics: RwLock<Vec<Topic>>,
    roadmaps: RwLock<HashMap<String, Roadmap>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> NexusError {
    NexusError::Storage(e.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored turn, in insertion order
    pub fn all_turns(&self) -> Vec<Turn> {
        self.turns.read().map(|t| t.clone()).unwrap_or_default()
    }

    /// Every stored topic, in insertion order
    pub fn all_topics(&self) -> Vec<Topic> {
        self.topics.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn roadmap_count(&self) -> usize {
        self.roadmaps.read().map(|r| r.len()).unwrap_or_default()
    }
}

impl TurnStore for MemoryStore {
    fn save(&self, turn: &Turn) -> Result<()> {
        let mut turns = self.turns.write().map_err(poisoned)?;
        match turns.iter_mut().find(|t| t.id == turn.id) {
            Some(slot) => *slot = turn.clone(),
            None => turns.push(turn.clone()),
        }
        Ok(())
    }

    fn find_history(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let turns = self.turns.read().map_err(poisoned)?;
        let mut history: Vec<Turn> = turns
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect();
        history.sort_by_key(|t| t.created_at);
        Ok(history)
    }

    fn count(&self, conversation_id: &str) -> Result<usize> {
        let turns = self.turns.read().map_err(poisoned)?;
        Ok(turns.iter().filter(|t| t.conversation_id == conversation_id).count())
    }
}

impl ConversationStore for MemoryStore {
    fn create(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .map_err(poisoned)?
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().map_err(poisoned)?.get(id).cloned())
    }

    fn record_activity(&self, id: &str, added: u32) -> Result<Conversation> {
        let mut conversations = self.conversations.write().map_err(poisoned)?;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| NexusError::NotFound(format!("conversation {}", id)))?;
        conversation.record_activity(added);
        Ok(conversation.clone())
    }

    fn list(&self) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> =
            self.conversations.read().map_err(poisoned)?.values().cloned().collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }
}

impl TopicStore for MemoryStore {
    fn save(&self, mut topic: Topic) -> Result<Topic> {
        topic.ensure_id();
        self.topics.write().map_err(poisoned)?.push(topic.clone());
        Ok(topic)
    }

    fn list_for_roadmap(&self, roadmap_id: &str) -> Result<Vec<Topic>> {
        let topics = self.topics.read().map_err(poisoned)?;
        let mut found: Vec<Topic> = topics.iter().filter(|t| t.roadmap_id == roadmap_id).cloned().collect();
        found.sort_by_key(|t| t.sequence_order);
        Ok(found)
    }
}

impl RoadmapStore for MemoryStore {
    fn create_draft(&self, draft: RoadmapDraft) -> Result<Roadmap> {
        let roadmap = Roadmap::from_draft(draft);
        self.roadmaps
            .write()
            .map_err(poisoned)?
            .insert(roadmap.id.clone(), roadmap.clone());
        Ok(roadmap)
    }

    fn finalize_counts(&self, id: &str, total_topics: u32) -> Result<Roadmap> {
        let mut roadmaps = self.roadmaps.write().map_err(poisoned)?;
        let roadmap = roadmaps
            .get_mut(id)
            .ok_or_else(|| NexusError::NotFound(format!("roadmap {}", id)))?;
        roadmap.finalize_counts(total_topics);
        Ok(roadmap.clone())
    }

    fn get_roadmap(&self, id: &str) -> Result<Option<Roadmap>> {
        Ok(self.roadmaps.read().map_err(poisoned)?.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RoadmapRequest, TopicDraft};

    #[test]
    fn test_turns_by_conversation() {
        let store = MemoryStore::new();
        TurnStore::save(&store, &Turn::user("a", "1")).unwrap();
        TurnStore::save(&store, &Turn::user("b", "2")).unwrap();
        TurnStore::save(&store, &Turn::assistant("a", "3", "m")).unwrap();

        assert_eq!(store.count("a").unwrap(), 2);
        assert_eq!(store.find_history("b").unwrap().len(), 1);
        assert_eq!(store.all_turns().len(), 3);
    }

    #[test]
    fn test_save_replaces_turn_with_same_id() {
        let store = MemoryStore::new();
        let turn = Turn::assistant("a", "first", "m").with_id("turn-ses-1");
        TurnStore::save(&store, &turn).unwrap();
        TurnStore::save(&store, &turn.clone().truncated()).unwrap();

        let turns = store.all_turns();
        assert_eq!(turns.len(), 1);
        assert!(turns[0].truncated);
    }

    #[test]
    fn test_conversation_lifecycle() {
        let store = MemoryStore::new();
        let conversation = Conversation::new("hi", "m", 60);
        store.create(&conversation).unwrap();
        store.record_activity(&conversation.id, 2).unwrap();

        let fetched = ConversationStore::get(&store, &conversation.id).unwrap().unwrap();
        assert_eq!(fetched.message_count, 2);
        assert!(store.record_activity("nope", 1).is_err());
    }

    #[test]
    fn test_roadmap_and_topics() {
        let store = MemoryStore::new();
        let roadmap = store
            .create_draft(RoadmapDraft::from_request(&RoadmapRequest::new("Go"), "m"))
            .unwrap();
        let topic = TopicStore::save(&store, Topic::from_draft(&roadmap.id, 1, TopicDraft::default())).unwrap();
        assert!(!topic.id.is_empty());

        store.finalize_counts(&roadmap.id, 1).unwrap();
        assert_eq!(store.get_roadmap(&roadmap.id).unwrap().unwrap().total_topics, 1);
        assert_eq!(store.list_for_roadmap(&roadmap.id).unwrap(), vec![topic]);
        assert_eq!(store.roadmap_count(), 1);
    }
}
