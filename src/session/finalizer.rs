//! One-time terminal handling of a streaming session.
//!
//! The finalizer turns a [`SessionResult`] into durable records and the
//! caller's terminal event. It is keyed by session id: a second call for the
//! same session writes nothing and returns `None`. Dedup state lives in
//! memory and only covers the most recent sessions of one process; the reply
//! turn id is derived from the session id, so a repeated write replaces the
//! reply instead of adding another.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::domain::{PartialOutput, SessionResult, Turn};
use crate::error::Result;
use crate::framing::FramedEvent;
use crate::id::reply_turn_id;
use crate::pipeline::{DEFAULT_CLOSE_TAG, DEFAULT_OPEN_TAG, strip_reasoning_artifacts};
use crate::store::{ConversationStore, RoadmapStore, TurnStore};

/// What a session produced, beyond its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    Chat {
        conversation_id: String,
    },
    Roadmap {
        /// None when no topic arrived, so no draft was created
        roadmap_id: Option<String>,
        topic_count: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub model: String,
    pub kind: SessionKind,
}

impl SessionContext {
    pub fn chat(session_id: impl Into<String>, conversation_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            model: model.into(),
            kind: SessionKind::Chat {
                conversation_id: conversation_id.into(),
            },
        }
    }

    pub fn roadmap(
        session_id: impl Into<String>,
        model: impl Into<String>,
        roadmap_id: Option<String>,
        topic_count: u32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            model: model.into(),
            kind: SessionKind::Roadmap {
                roadmap_id,
                topic_count,
            },
        }
    }
}

/// Finalized session ids remembered for deduplication
pub const DEFAULT_FINALIZED_CAPACITY: usize = 4096;

/// Bounded set of finalized session ids, oldest evicted first
#[derive(Debug)]
struct FinalizedSessions {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl FinalizedSessions {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, session_id: &str) -> bool {
        self.ids.contains(session_id)
    }

    fn claim(&mut self, session_id: &str) -> bool {
        if !self.ids.insert(session_id.to_string()) {
            return false;
        }
        self.order.push_back(session_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        true
    }

    fn release(&mut self, session_id: &str) {
        if self.ids.remove(session_id) {
            self.order.retain(|id| id != session_id);
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Notified after a session is finalized. Failures are logged and ignored.
pub trait FinalizeHook: Send + Sync {
    fn on_finalized(&self, ctx: &SessionContext, result: &SessionResult) -> Result<()>;
}

pub struct SessionFinalizer {
    turns: Arc<dyn TurnStore>,
    conversations: Arc<dyn ConversationStore>,
    roadmaps: Arc<dyn RoadmapStore>,
    hooks: Vec<Arc<dyn FinalizeHook>>,
    open_tag: String,
    close_tag: String,
    finalized: Mutex<FinalizedSessions>,
}

impl SessionFinalizer {
    pub fn new(
        turns: Arc<dyn TurnStore>,
        conversations: Arc<dyn ConversationStore>,
        roadmaps: Arc<dyn RoadmapStore>,
    ) -> Self {
        Self {
            turns,
            conversations,
            roadmaps,
            hooks: Vec::new(),
            open_tag: DEFAULT_OPEN_TAG.to_string(),
            close_tag: DEFAULT_CLOSE_TAG.to_string(),
            finalized: Mutex::new(FinalizedSessions::new(DEFAULT_FINALIZED_CAPACITY)),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn FinalizeHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Reasoning tags stripped from final content
    pub fn with_tags(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.open_tag = open.into();
        self.close_tag = close.into();
        self
    }

    /// Number of most recent session ids remembered for deduplication
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.finalized = Mutex::new(FinalizedSessions::new(capacity));
        self
    }

    pub fn is_finalized(&self, session_id: &str) -> bool {
        self.finalized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(session_id)
    }

    /// Session ids currently remembered
    pub fn remembered(&self) -> usize {
        self.finalized.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Persist the outcome and build the terminal event.
    ///
    /// Returns None for a session that was already finalized. A store failure
    /// yields an `error` event and releases the session id so a retry can
    /// persist it later. Hooks run only once the outcome is persisted.
    pub fn finalize(&self, ctx: &SessionContext, result: SessionResult) -> Option<FramedEvent> {
        if !self.claim(&ctx.session_id) {
            log::debug!("Session {} already finalized", ctx.session_id);
            return None;
        }

        match self.persist(ctx, &result) {
            Ok(event) => {
                log::info!("Finalized session {} as {}", ctx.session_id, result.label());
                self.run_hooks(ctx, &result);
                Some(event)
            }
            Err(e) => {
                log::error!("Failed to persist session {}: {}", ctx.session_id, e);
                self.release(&ctx.session_id);
                Some(FramedEvent::error(&format!("Failed to save result: {}", e)))
            }
        }
    }

    fn run_hooks(&self, ctx: &SessionContext, result: &SessionResult) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_finalized(ctx, result) {
                log::warn!("Finalize hook failed for session {}: {}", ctx.session_id, e);
            }
        }
    }

    fn claim(&self, session_id: &str) -> bool {
        self.finalized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .claim(session_id)
    }

    fn release(&self, session_id: &str) {
        self.finalized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .release(session_id);
    }

    fn persist(&self, ctx: &SessionContext, result: &SessionResult) -> Result<FramedEvent> {
        match &ctx.kind {
            SessionKind::Chat { conversation_id } => self.persist_chat(ctx, conversation_id, result),
            SessionKind::Roadmap {
                roadmap_id,
                topic_count,
            } => {
                // Failed and cancelled runs keep the topics already stored
                if let Some(id) = roadmap_id {
                    self.roadmaps.finalize_counts(id, *topic_count)?;
                }
                Ok(match result {
                    SessionResult::Completed { .. } => FramedEvent::roadmap_done(roadmap_id.as_deref(), *topic_count),
                    SessionResult::Failed { reason, .. } => FramedEvent::error(reason),
                    SessionResult::Cancelled { .. } => FramedEvent::error("cancelled"),
                })
            }
        }
    }

    fn persist_chat(&self, ctx: &SessionContext, conversation_id: &str, result: &SessionResult) -> Result<FramedEvent> {
        match result {
            SessionResult::Completed { content, reasoning, .. } => {
                let turn = self.assistant_turn(ctx, conversation_id, content, reasoning.as_deref().unwrap_or(""));
                self.turns.save(&turn)?;
                self.conversations.record_activity(conversation_id, 1)?;
                Ok(FramedEvent::chat_done(conversation_id, &ctx.model))
            }
            SessionResult::Failed { reason, partial } => {
                if let Some(PartialOutput { content, reasoning }) = partial {
                    let turn = self
                        .assistant_turn(ctx, conversation_id, content, reasoning)
                        .truncated();
                    self.turns.save(&turn)?;
                    self.conversations.record_activity(conversation_id, 1)?;
                    log::info!("Saved truncated turn {} for session {}", turn.id, ctx.session_id);
                }
                Ok(FramedEvent::error(reason))
            }
            SessionResult::Cancelled { .. } => Ok(FramedEvent::error("cancelled")),
        }
    }

    fn assistant_turn(&self, ctx: &SessionContext, conversation_id: &str, content: &str, reasoning: &str) -> Turn {
        let (content, thinking) = strip_reasoning_artifacts(content, reasoning, &self.open_tag, &self.close_tag);
        Turn::assistant(conversation_id, content, ctx.model.as_str())
            .with_id(reply_turn_id(&ctx.session_id))
            .with_thinking(thinking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Conversation, RoadmapDraft, RoadmapRequest};
    use crate::error::NexusError;
    use crate::framing::EventName;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (Arc<MemoryStore>, SessionFinalizer, Conversation) {
        let store = Arc::new(MemoryStore::new());
        let conversation = Conversation::new("hello", "m", 60);
        store.create(&conversation).unwrap();
        let finalizer = SessionFinalizer::new(store.clone(), store.clone(), store.clone());
        (store, finalizer, conversation)
    }

    fn completed(content: &str, reasoning: Option<&str>) -> SessionResult {
        SessionResult::Completed {
            content: content.to_string(),
            reasoning: reasoning.map(str::to_string),
            records: vec![],
        }
    }

    #[test]
    fn test_completed_chat_persists_turn() {
        let (store, finalizer, conversation) = setup();
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        let event = finalizer.finalize(&ctx, completed("answer", Some("why"))).unwrap();
        assert_eq!(event.event, EventName::Done);
        assert_eq!(event.data["sessionId"], conversation.id.as_str());
        assert_eq!(event.data["model"], "m");

        let turns = store.all_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "answer");
        assert_eq!(turns[0].thinking.as_deref(), Some("why"));
        assert_eq!(turns[0].model.as_deref(), Some("m"));
        assert!(!turns[0].truncated);
        assert_eq!(
            ConversationStore::get(store.as_ref(), &conversation.id)
                .unwrap()
                .unwrap()
                .message_count,
            1
        );
    }

    #[test]
    fn test_completed_chat_strips_leftover_tags() {
        let (store, finalizer, conversation) = setup();
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        finalizer.finalize(&ctx, completed("<think>plan</think>answer", None));
        let turn = &store.all_turns()[0];
        assert_eq!(turn.content, "answer");
        assert_eq!(turn.thinking.as_deref(), Some("plan"));
    }

    #[test]
    fn test_duplicate_finalize_persists_once() {
        let (store, finalizer, conversation) = setup();
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        assert!(finalizer.finalize(&ctx, completed("a", None)).is_some());
        assert!(finalizer.finalize(&ctx, completed("a", None)).is_none());
        assert_eq!(store.all_turns().len(), 1);
        assert!(finalizer.is_finalized("ses-1"));
    }

    #[test]
    fn test_failed_without_partial_saves_nothing() {
        let (store, finalizer, conversation) = setup();
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        let event = finalizer
            .finalize(
                &ctx,
                SessionResult::Failed {
                    reason: "Authentication failed".to_string(),
                    partial: None,
                },
            )
            .unwrap();
        assert_eq!(event, FramedEvent::error("Authentication failed"));
        assert!(store.all_turns().is_empty());
    }

    #[test]
    fn test_failed_with_partial_saves_truncated_turn() {
        let (store, finalizer, conversation) = setup();
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        let event = finalizer
            .finalize(
                &ctx,
                SessionResult::Failed {
                    reason: "reset".to_string(),
                    partial: Some(PartialOutput::new("abc", "")),
                },
            )
            .unwrap();
        assert!(event.is_terminal());
        assert_eq!(event.event, EventName::Error);

        let turns = store.all_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "abc");
        assert!(turns[0].truncated);
        assert_eq!(turns[0].thinking, None);
    }

    #[test]
    fn test_cancelled_saves_nothing() {
        let (store, finalizer, conversation) = setup();
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        let event = finalizer
            .finalize(
                &ctx,
                SessionResult::Cancelled {
                    partial: Some(PartialOutput::new("half", "")),
                },
            )
            .unwrap();
        assert_eq!(event, FramedEvent::error("cancelled"));
        assert!(store.all_turns().is_empty());
    }

    #[test]
    fn test_store_failure_releases_claim() {
        let store = Arc::new(MemoryStore::new());
        let finalizer = SessionFinalizer::new(store.clone(), store.clone(), store.clone());
        // No conversation stored, so record_activity fails
        let ctx = SessionContext::chat("ses-1", "conv-missing", "m");

        let event = finalizer.finalize(&ctx, completed("a", None)).unwrap();
        assert_eq!(event.event, EventName::Error);
        assert!(event.data["message"].as_str().unwrap().contains("conv-missing"));
        assert!(!finalizer.is_finalized("ses-1"));
    }

    #[test]
    fn test_retry_after_partial_failure_keeps_one_reply() {
        let store = Arc::new(MemoryStore::new());
        let finalizer = SessionFinalizer::new(store.clone(), store.clone(), store.clone());
        let conversation = Conversation::new("hello", "m", 60);
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        // The reply is saved, then record_activity fails on the missing conversation
        let event = finalizer.finalize(&ctx, completed("answer", None)).unwrap();
        assert_eq!(event.event, EventName::Error);
        assert_eq!(store.all_turns().len(), 1);

        store.create(&conversation).unwrap();
        let event = finalizer.finalize(&ctx, completed("answer", None)).unwrap();
        assert_eq!(event.event, EventName::Done);

        let turns = store.all_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].id, reply_turn_id("ses-1"));
        assert_eq!(
            ConversationStore::get(store.as_ref(), &conversation.id)
                .unwrap()
                .unwrap()
                .message_count,
            1
        );
        assert!(finalizer.finalize(&ctx, completed("answer", None)).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest_session() {
        let (_store, finalizer, conversation) = setup();
        let finalizer = finalizer.with_capacity(2);

        for id in ["ses-1", "ses-2", "ses-3"] {
            let ctx = SessionContext::chat(id, &conversation.id, "m");
            finalizer.finalize(&ctx, SessionResult::Cancelled { partial: None });
        }
        assert_eq!(finalizer.remembered(), 2);
        assert!(!finalizer.is_finalized("ses-1"));
        assert!(finalizer.is_finalized("ses-2"));
        assert!(finalizer.is_finalized("ses-3"));
    }

    #[test]
    fn test_roadmap_finalizes_counts() {
        let store = Arc::new(MemoryStore::new());
        let finalizer = SessionFinalizer::new(store.clone(), store.clone(), store.clone());
        let roadmap = store
            .create_draft(RoadmapDraft::from_request(&RoadmapRequest::new("Rust"), "m"))
            .unwrap();

        let ctx = SessionContext::roadmap("ses-2", "m", Some(roadmap.id.clone()), 3);
        let event = finalizer.finalize(&ctx, completed("", None)).unwrap();
        assert_eq!(event.data["roadmapId"], roadmap.id.as_str());
        assert_eq!(event.data["totalTopics"], 3);
        assert_eq!(store.get_roadmap(&roadmap.id).unwrap().unwrap().total_topics, 3);
    }

    #[test]
    fn test_roadmap_without_topics() {
        let store = Arc::new(MemoryStore::new());
        let finalizer = SessionFinalizer::new(store.clone(), store.clone(), store.clone());

        let ctx = SessionContext::roadmap("ses-3", "m", None, 0);
        let event = finalizer.finalize(&ctx, completed("", None)).unwrap();
        assert!(event.data["roadmapId"].is_null());
        assert_eq!(store.roadmap_count(), 0);
    }

    struct CountingHook(AtomicUsize);

    impl FinalizeHook for CountingHook {
        fn on_finalized(&self, _ctx: &SessionContext, _result: &SessionResult) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(NexusError::Storage("hook down".to_string()))
        }
    }

    #[test]
    fn test_hook_failure_does_not_change_event() {
        let (_store, finalizer, conversation) = setup();
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let finalizer = finalizer.with_hook(hook.clone());
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        let event = finalizer.finalize(&ctx, completed("a", None)).unwrap();
        assert_eq!(event.event, EventName::Done);
        finalizer.finalize(&ctx, completed("a", None));
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hooks_wait_for_successful_persist() {
        let store = Arc::new(MemoryStore::new());
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let finalizer = SessionFinalizer::new(store.clone(), store.clone(), store.clone()).with_hook(hook.clone());
        let conversation = Conversation::new("hello", "m", 60);
        let ctx = SessionContext::chat("ses-1", &conversation.id, "m");

        finalizer.finalize(&ctx, completed("a", None));
        assert_eq!(hook.0.load(Ordering::SeqCst), 0);

        store.create(&conversation).unwrap();
        finalizer.finalize(&ctx, completed("a", None));
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }
}
