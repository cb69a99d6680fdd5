//! ID generation utilities for Nexus
//!
//! Provides functions for generating unique identifiers for sessions,
//! conversations, turns, roadmaps and topics.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Generate a prefixed ID
///
/// Format: `{prefix}-{timestamp_ms}-{random_hex}`
/// Example: `ses-1738300800123-a1b2c3d4`
pub fn generate_id(prefix: &str) -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("{}-{}-{:08x}", prefix, timestamp, random)
}

/// Generate a streaming session ID (one per provider call)
pub fn generate_session_id() -> String {
    generate_id("ses")
}

/// Generate a conversation ID
pub fn generate_conversation_id() -> String {
    generate_id("conv")
}

/// Generate a turn ID
pub fn generate_turn_id() -> String {
    generate_id("turn")
}

/// Turn ID of the assistant reply produced by a session
///
/// Stable for a given session, so re-saving the reply replaces it.
pub fn reply_turn_id(session_id: &str) -> String {
    format!("turn-{}", session_id)
}

/// Generate a roadmap ID
pub fn generate_roadmap_id() -> String {
    generate_id("rm")
}

/// Generate a topic ID
pub fn generate_topic_id() -> String {
    generate_id("top")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("ses");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ses");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_uniqueness() {
        let id1 = generate_session_id();
        let id2 = generate_session_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_prefixes() {
        assert!(generate_session_id().starts_with("ses-"));
        assert!(generate_conversation_id().starts_with("conv-"));
        assert!(generate_turn_id().starts_with("turn-"));
        assert!(generate_roadmap_id().starts_with("rm-"));
        assert!(generate_topic_id().starts_with("top-"));
    }

    #[test]
    fn test_reply_turn_id_is_stable() {
        let session_id = generate_session_id();
        assert_eq!(reply_turn_id(&session_id), reply_turn_id(&session_id));
        assert_eq!(reply_turn_id("ses-1"), "turn-ses-1");
    }
}
