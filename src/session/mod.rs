//! Streaming sessions
//!
//! A session owns one provider stream from request to terminal event:
//! - ChatService: reasoning/content split of a chat reply
//! - RoadmapService: narrative plus topic records
//! - SessionFinalizer: exactly-once persistence of the outcome
//! - EventStreamHandle: the caller's ordered view of framed events

pub mod chat;
pub mod finalizer;
pub mod handle;
pub mod roadmap;

pub use chat::{ChatRequest, ChatService};
pub use finalizer::{DEFAULT_FINALIZED_CAPACITY, FinalizeHook, SessionContext, SessionFinalizer, SessionKind};
pub use handle::{DEFAULT_EVENT_BUFFER, EventSink, EventStreamHandle, PumpEnd, create_event_channel, pump};
pub use roadmap::RoadmapService;
