//! Caller-visible named events.
//!
//! Every payload is built as a JSON value and serialized with `serde_json`,
//! which escapes quotes, backslashes and all control characters, so model
//! text can never break the `event:`/`data:` framing.

use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::Topic;

/// Name of a framed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
    Session,
    Thinking,
    Content,
    Topic,
    Done,
    Error,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Session => "session",
            EventName::Thinking => "thinking",
            EventName::Content => "content",
            EventName::Topic => "topic",
            EventName::Done => "done",
            EventName::Error => "error",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event delivered to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FramedEvent {
    pub event: EventName,
    pub data: Value,
}

impl FramedEvent {
    pub fn new(event: EventName, data: Value) -> Self {
        Self { event, data }
    }

    /// `{"sessionId", "isNew"}`
    pub fn session(session_id: &str, is_new: bool) -> Self {
        Self::new(EventName::Session, json!({ "sessionId": session_id, "isNew": is_new }))
    }

    pub fn thinking(text: &str) -> Self {
        Self::new(EventName::Thinking, json!({ "content": text }))
    }

    pub fn content(text: &str) -> Self {
        Self::new(EventName::Content, json!({ "content": text }))
    }

    /// The stored topic, camelCase, including `id` and `sequenceOrder`
    pub fn topic(topic: &Topic) -> Self {
        let data = serde_json::to_value(topic).unwrap_or_else(|e| {
            log::error!("Failed to encode topic {}: {}", topic.id, e);
            json!({ "id": topic.id, "sequenceOrder": topic.sequence_order })
        });
        Self::new(EventName::Topic, data)
    }

    /// Chat completion: `{"sessionId", "model"}`
    pub fn chat_done(session_id: &str, model: &str) -> Self {
        Self::new(EventName::Done, json!({ "sessionId": session_id, "model": model }))
    }

    /// Roadmap completion: `{"roadmapId", "totalTopics"}`
    pub fn roadmap_done(roadmap_id: Option<&str>, total_topics: u32) -> Self {
        Self::new(
            EventName::Done,
            json!({ "roadmapId": roadmap_id, "totalTopics": total_topics }),
        )
    }

    pub fn error(message: &str) -> Self {
        Self::new(EventName::Error, json!({ "message": message }))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.event, EventName::Done | EventName::Error)
    }

    /// Text carried by a `thinking`/`content` event
    pub fn text(&self) -> Option<&str> {
        match self.event {
            EventName::Thinking | EventName::Content => self.data.get("content").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Wire form: `event: <name>\ndata: <json>\n\n`
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TopicDraft;

    #[test]
    fn test_session_event() {
        let event = FramedEvent::session("ses-1", true);
        let sse = event.to_sse();
        assert!(sse.starts_with("event: session\ndata: {"));
        assert!(sse.ends_with("}\n\n"));
        assert_eq!(event.data["sessionId"], "ses-1");
        assert_eq!(event.data["isNew"], true);
    }

    #[test]
    fn test_content_escaping() {
        let event = FramedEvent::content("say \"hi\"\\\n\u{1}");
        let sse = event.to_sse();
        assert!(sse.starts_with("event: content\ndata: "));
        assert!(sse.contains(r#"say \"hi\"\\\n\u0001"#));
        // exactly one frame terminator
        assert_eq!(sse.matches("\n\n").count(), 1);

        let data = sse.trim_end().strip_prefix("event: content\ndata: ").unwrap();
        let decoded: Value = serde_json::from_str(data).unwrap();
        assert_eq!(decoded["content"], "say \"hi\"\\\n\u{1}");
    }

    #[test]
    fn test_empty_content_event() {
        let event = FramedEvent::content("");
        assert_eq!(event.text(), Some(""));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_topic_event_fields() {
        let mut topic = Topic::from_draft("rm-1", 3, TopicDraft::default());
        topic.ensure_id();
        let event = FramedEvent::topic(&topic);
        assert_eq!(event.event, EventName::Topic);
        assert_eq!(event.data["id"], topic.id.as_str());
        assert_eq!(event.data["sequenceOrder"], 3);
        assert_eq!(event.data["title"], "Untitled Topic");
    }

    #[test]
    fn test_done_events() {
        let done = FramedEvent::chat_done("ses-1", "m");
        assert!(done.is_terminal());
        assert_eq!(done.data["model"], "m");

        let done = FramedEvent::roadmap_done(Some("rm-1"), 4);
        assert_eq!(done.data["roadmapId"], "rm-1");
        assert_eq!(done.data["totalTopics"], 4);

        let done = FramedEvent::roadmap_done(None, 0);
        assert!(done.data["roadmapId"].is_null());
    }

    #[test]
    fn test_error_event() {
        let event = FramedEvent::error("cancelled");
        assert!(event.is_terminal());
        assert_eq!(event.data["message"], "cancelled");
        assert_eq!(event.text(), None);
    }
}
