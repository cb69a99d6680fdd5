//! LLM Client Layer - OpenAI-compatible provider integration with streaming
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction
//! - OpenAiClient implementation over SSE
//! - Retry and deadline policy
//! - Fragment parsing for streamed deltas

pub mod client;
pub mod openai;
pub mod retry;
pub mod streaming;
pub mod types;

pub use client::{LlmClient, LlmError, MockAttempt, MockLlmClient};
pub use openai::{OpenAiClient, PLACEHOLDER_API_KEY, ProviderSettings};
pub use retry::{RetryPolicy, resilient_stream, retry_call};
pub use streaming::{Fragment, FragmentStream, REASONING_MARKER, SsePayload, parse_sse_data};
pub use types::{CompletionRequest, CompletionResponse, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Message, Role, Usage};
