//! Domain types for Nexus
//!
//! This module contains the records the streaming sessions produce:
//! - Turn / Conversation: chat history
//! - Topic / Roadmap: generated learning roadmaps
//! - SessionResult: how a streaming session ended

pub mod outcome;
pub mod roadmap;
pub mod topic;
pub mod turn;

pub use outcome::{PartialOutput, SessionResult};
pub use roadmap::{Roadmap, RoadmapDraft, RoadmapRequest, RoadmapStatus};
pub use topic::{Resource, Topic, TopicDraft, TopicStatus};
pub use turn::{Conversation, Turn, title_from_message};
