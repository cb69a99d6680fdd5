//! Storage layer for Nexus
//!
//! Collaborator traits the sessions persist through, plus two
//! implementations:
//! - JsonlStore: one JSONL file per record kind with an in-memory cache
//! - MemoryStore: process-local, for tests and ephemeral runs

pub mod jsonl;
pub mod memory;
pub mod traits;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use traits::{ConversationStore, Filter, FilterOp, HasId, RoadmapStore, TopicStore, TurnStore};
