//! Nexus - a streaming completion pipeline for tutoring chat and roadmaps
//!
//! Nexus turns a single provider completion call into a live, multi-channel
//! event stream: reasoning split from content, structured topic records
//! decoded as they arrive, and exactly one durable outcome per session.

pub mod config;
pub mod domain;
pub mod error;
pub mod framing;
pub mod id;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod store;

pub use error::{NexusError, Result};
