//! JSONL-based store with in-memory caching.
//!
//! Each record kind lives in its own `<collection>.jsonl` file under the
//! store directory. Inserts append; updates rewrite the collection.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{ConversationStore, Filter, HasId, RoadmapStore, TopicStore, TurnStore};
use crate::domain::{Conversation, Roadmap, RoadmapDraft, Topic, Turn};
use crate::error::{NexusError, Result};

const TURNS: &str = "turns";
const CONVERSATIONS: &str = "conversations";
const TOPICS: &str = "topics";
const ROADMAPS: &str = "roadmaps";

/// JSONL-based store with in-memory caching.
pub struct JsonlStore {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl JsonlStore {
    /// Open (creating if needed) a store at the given directory.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(|e| NexusError::Storage(e.to_string()))?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(|e| NexusError::Storage(e.to_string()))?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let records = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let mut records = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    records.push(serde_json::from_str(&line)?);
                }
            }
            records
        } else {
            Vec::new()
        };

        log::debug!("Loaded {} records from {}", records.len(), path.display());
        cache.insert(collection.to_string(), records);
        Ok(())
    }

    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Rewrite the entire collection file from cache.
    fn rewrite_file(&self, collection: &str) -> Result<()> {
        let cache = self.cache.read().map_err(|e| NexusError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| NexusError::Storage(format!("Collection not loaded: {}", collection)))?;

        let path = self.collection_path(collection);
        let mut file = File::create(&path)?;
        for record in records {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        Ok(())
    }

    fn insert<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;
        let value = serde_json::to_value(record)?;

        // File first, it is the source of truth
        self.append_to_file(collection, &value)?;

        let mut cache = self.cache.write().map_err(|e| NexusError::Storage(e.to_string()))?;
        cache.entry(collection.to_string()).or_default().push(value);
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| NexusError::Storage(e.to_string()))?;
        let found = cache
            .get(collection)
            .and_then(|records| records.iter().find(|r| r.get("id").and_then(|v| v.as_str()) == Some(id)));

        match found {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn replace<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;
        let value = serde_json::to_value(record)?;

        {
            let mut cache = self.cache.write().map_err(|e| NexusError::Storage(e.to_string()))?;
            let records = cache
                .get_mut(collection)
                .ok_or_else(|| NexusError::Storage(format!("Collection not loaded: {}", collection)))?;

            let slot = records
                .iter_mut()
                .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(record.id()))
                .ok_or_else(|| NexusError::NotFound(format!("{} {}", collection, record.id())))?;
            *slot = value;
        }

        self.rewrite_file(collection)
    }

    fn contains(&self, collection: &str, id: &str) -> Result<bool> {
        self.ensure_loaded(collection)?;
        let cache = self.cache.read().map_err(|e| NexusError::Storage(e.to_string()))?;
        Ok(cache
            .get(collection)
            .is_some_and(|records| records.iter().any(|r| r.get("id").and_then(|v| v.as_str()) == Some(id))))
    }

    /// Replace the record with the same id, or append it
    fn upsert<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        if self.contains(collection, record.id())? {
            self.replace(collection, record)
        } else {
            self.insert(collection, record)
        }
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| NexusError::Storage(e.to_string()))?;
        let mut results = Vec::new();
        if let Some(records) = cache.get(collection) {
            for record in records.iter().filter(|r| filters.iter().all(|f| f.matches(r))) {
                results.push(serde_json::from_value(record.clone())?);
            }
        }
        Ok(results)
    }
}

impl TurnStore for JsonlStore {
    fn save(&self, turn: &Turn) -> Result<()> {
        self.upsert(TURNS, turn)
    }

    fn find_history(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let mut turns: Vec<Turn> = self.query(TURNS, &[Filter::eq("conversationId", conversation_id)])?;
        turns.sort_by_key(|t| t.created_at);
        Ok(turns)
    }

    fn count(&self, conversation_id: &str) -> Result<usize> {
        Ok(self.find_history(conversation_id)?.len())
    }
}

impl ConversationStore for JsonlStore {
    fn create(&self, conversation: &Conversation) -> Result<()> {
        self.insert(CONVERSATIONS, conversation)
    }

    fn get(&self, id: &str) -> Result<Option<Conversation>> {
        self.fetch(CONVERSATIONS, id)
    }

    fn record_activity(&self, id: &str, added: u32) -> Result<Conversation> {
        let mut conversation: Conversation = self
            .fetch(CONVERSATIONS, id)?
            .ok_or_else(|| NexusError::NotFound(format!("conversation {}", id)))?;
        conversation.record_activity(added);
        self.replace(CONVERSATIONS, &conversation)?;
        Ok(conversation)
    }

    fn list(&self) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self.query(CONVERSATIONS, &[])?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }
}

impl TopicStore for JsonlStore {
    fn save(&self, mut topic: Topic) -> Result<Topic> {
        topic.ensure_id();
        self.insert(TOPICS, &topic)?;
        Ok(topic)
    }

    fn list_for_roadmap(&self, roadmap_id: &str) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = self.query(TOPICS, &[Filter::eq("roadmapId", roadmap_id)])?;
        topics.sort_by_key(|t| t.sequence_order);
        Ok(topics)
    }
}

impl RoadmapStore for JsonlStore {
    fn create_draft(&self, draft: RoadmapDraft) -> Result<Roadmap> {
        let roadmap = Roadmap::from_draft(draft);
        self.insert(ROADMAPS, &roadmap)?;
        Ok(roadmap)
    }

    fn finalize_counts(&self, id: &str, total_topics: u32) -> Result<Roadmap> {
        let mut roadmap: Roadmap = self
            .fetch(ROADMAPS, id)?
            .ok_or_else(|| NexusError::NotFound(format!("roadmap {}", id)))?;
        roadmap.finalize_counts(total_topics);
        self.replace(ROADMAPS, &roadmap)?;
        Ok(roadmap)
    }

    fn get_roadmap(&self, id: &str) -> Result<Option<Roadmap>> {
        self.fetch(ROADMAPS, id)
    }
}
